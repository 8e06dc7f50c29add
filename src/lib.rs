//! **Hematite**: volume-constrained truss topology optimization with an
//! optional learned stand-in for the linear solve.
//!
//! 1. **Geometry** (`datatypes`, `mesher`): node and bar arenas, load cases,
//!    braced grid meshing.
//! 2. **Solve** (`solver`): sparse stiffness assembly, reduction to free DOFs
//!    and Cholesky solve.
//! 3. **Evaluation** (`sensitivity`): compliance, its area gradient, bar
//!    forces and stresses.
//! 4. **Surrogate** (`surrogate`): Latin hypercube sampling and RBF or MLP
//!    regression of displacements.
//! 5. **Optimizer** (`optimizer`): optimality criteria and augmented
//!    Lagrangian solvers via `argmin`.
//! 6. **Input** (`config`): json problem files.

pub mod config;
pub mod datatypes;
pub mod error;
pub mod mesher;
pub mod optimizer;
pub mod sensitivity;
pub mod solver;
pub mod surrogate;
