use log::debug;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{coo::CooMatrix, factorization::CscCholesky, CscMatrix};

use crate::{
    datatypes::{Geometry, LoadCase, DOF},
    error::TrussError,
};

/// Smallest accepted Cholesky pivot, relative to the largest diagonal entry
/// of the reduced stiffness matrix
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Produces free-DOF displacements for a design. The exact linear solve and
/// trained surrogates both implement this.
pub trait DisplacementSource {
    /// Displacements at `load_case.free_dofs()`, in that order
    fn free_displacements(
        &self,
        geometry: &Geometry,
        load_case: &LoadCase,
        areas: &[f64],
    ) -> Result<DVector<f64>, TrussError>;

    fn name(&self) -> &str;
}

impl<S: DisplacementSource + ?Sized> DisplacementSource for &S {
    fn free_displacements(
        &self,
        geometry: &Geometry,
        load_case: &LoadCase,
        areas: &[f64],
    ) -> Result<DVector<f64>, TrussError> {
        (**self).free_displacements(geometry, load_case, areas)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Assembles and solves the reduced stiffness system on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactSolver;

impl DisplacementSource for ExactSolver {
    fn free_displacements(
        &self,
        geometry: &Geometry,
        load_case: &LoadCase,
        areas: &[f64],
    ) -> Result<DVector<f64>, TrussError> {
        let stiffness = assemble_stiffness(geometry, load_case.youngs_modulus(), areas)?;
        let reduced = reduce_system(&stiffness, load_case.free_dofs());
        solve_reduced(&reduced, &load_case.reduced_loads())
    }

    fn name(&self) -> &str {
        "exact"
    }
}

/// Checks a design vector against the bar arena. Areas must be strictly
/// positive since stress divides by them.
pub fn check_design(geometry: &Geometry, areas: &[f64]) -> Result<(), TrussError> {
    geometry.check_bar_vector("Design vector", areas)?;
    if let Some(bar) = areas.iter().position(|a| *a <= 0.0 || !a.is_finite()) {
        return Err(TrussError::Geometry(format!(
            "Bar {bar} has non-positive cross-section area {}",
            areas[bar]
        )));
    }
    Ok(())
}

/// Assembles the global stiffness matrix by superposition of bar blocks
///
/// Each bar contributes `[[B, -B], [-B, B]] * E * A / l` to the rows and
/// columns of its two nodes, where `B = e ⊗ e`.
///
/// # Arguments
/// * `geometry` - The truss geometry
/// * `youngs_modulus` - Modulus of each bar
/// * `areas` - Cross-section area of each bar
///
/// # Returns
/// A symmetric `2n x 2n` sparse matrix
pub fn assemble_stiffness(
    geometry: &Geometry,
    youngs_modulus: &[f64],
    areas: &[f64],
) -> Result<CscMatrix<f64>, TrussError> {
    geometry.check_bar_vector("Young's modulus vector", youngs_modulus)?;
    check_design(geometry, areas)?;

    let size = geometry.dof_count();
    let mut stiffness: CooMatrix<f64> = CooMatrix::new(size, size);

    for (i, bar) in geometry.bars().iter().enumerate() {
        let axial_stiffness = youngs_modulus[i] * areas[i] / geometry.lengths()[i];
        let block = geometry.transform(i) * axial_stiffness;

        for (local_row, node_row) in bar.nodes.iter().enumerate() {
            for (local_col, node_col) in bar.nodes.iter().enumerate() {
                let sign = if local_row == local_col { 1.0 } else { -1.0 };
                let global_row = node_row * DOF;
                let global_col = node_col * DOF;

                for r in 0..DOF {
                    for c in 0..DOF {
                        stiffness.push(global_row + r, global_col + c, sign * block[(r, c)]);
                    }
                }
            }
        }
    }

    Ok(CscMatrix::from(&stiffness))
}

/// Restricts a matrix to the given DOFs, keeping their order
pub fn reduce_system(stiffness: &CscMatrix<f64>, free_dofs: &[usize]) -> CscMatrix<f64> {
    let mut position: Vec<Option<usize>> = vec![None; stiffness.nrows()];
    for (reduced, dof) in free_dofs.iter().enumerate() {
        position[*dof] = Some(reduced);
    }

    let mut reduced: CooMatrix<f64> = CooMatrix::new(free_dofs.len(), free_dofs.len());
    for (row, col, value) in stiffness.triplet_iter() {
        if let (Some(r), Some(c)) = (position[row], position[col]) {
            reduced.push(r, c, *value);
        }
    }

    CscMatrix::from(&reduced)
}

/// Solves `K u = f` for a reduced stiffness matrix with a sparse Cholesky
/// factorization
///
/// # Returns
/// The reduced displacements, or `TrussError::SingularSystem` when a DOF has
/// no stiffness, the matrix is not positive definite, or a pivot collapses
/// below `PIVOT_TOLERANCE`. The system is never regularized.
pub fn solve_reduced(
    stiffness: &CscMatrix<f64>,
    rhs: &DVector<f64>,
) -> Result<DVector<f64>, TrussError> {
    let size = stiffness.nrows();
    if size == 0 {
        return Err(TrussError::SingularSystem(
            "Reduced system has no degrees of freedom".to_owned(),
        ));
    }
    if rhs.len() != size {
        return Err(TrussError::Geometry(format!(
            "Load vector has {} entries but the reduced system has {size}",
            rhs.len()
        )));
    }

    let mut diagonal = vec![0.0; size];
    for (row, col, value) in stiffness.triplet_iter() {
        if row == col {
            diagonal[row] += *value;
        }
    }
    if let Some(dof) = diagonal.iter().position(|d| *d <= 0.0) {
        return Err(TrussError::SingularSystem(format!(
            "Free DOF {dof} of the reduced system has no stiffness"
        )));
    }
    let scale = diagonal.iter().copied().fold(0.0, f64::max);

    let cholesky = match CscCholesky::factor(stiffness) {
        Ok(c) => c,
        Err(err) => {
            return Err(TrussError::SingularSystem(format!(
                "Cholesky factorization failed: {err:?}"
            )))
        }
    };

    let min_pivot = cholesky
        .l()
        .triplet_iter()
        .filter(|(row, col, _)| row == col)
        .map(|(_, _, value)| value * value)
        .fold(f64::INFINITY, f64::min);
    if min_pivot.is_nan() || min_pivot <= PIVOT_TOLERANCE * scale {
        return Err(TrussError::SingularSystem(format!(
            "Stiffness matrix is singular to working precision (pivot {min_pivot:e}, scale {scale:e}); \
             the structure is a mechanism or has insufficient supports"
        )));
    }

    let rhs_matrix = DMatrix::from_column_slice(size, 1, rhs.as_slice());
    let solution = cholesky.solve(&rhs_matrix);
    debug!("solved reduced system with {size} DOFs");

    Ok(DVector::from_iterator(size, solution.iter().copied()))
}

/// Writes reduced displacements into a zero field over every DOF
pub fn scatter_displacements(
    free_dofs: &[usize],
    reduced: &DVector<f64>,
    dof_count: usize,
) -> DVector<f64> {
    let mut field = DVector::zeros(dof_count);
    for (dof, value) in free_dofs.iter().zip(reduced.iter()) {
        field[*dof] = *value;
    }
    field
}

/// Solves for the full displacement field of a design
pub fn solve_displacements(
    geometry: &Geometry,
    load_case: &LoadCase,
    areas: &[f64],
) -> Result<DVector<f64>, TrussError> {
    let reduced = ExactSolver.free_displacements(geometry, load_case, areas)?;
    Ok(scatter_displacements(
        load_case.free_dofs(),
        &reduced,
        geometry.dof_count(),
    ))
}

/// Support reactions `K u - f` at the constrained DOFs. Free DOFs are zero.
pub fn compute_reactions(
    stiffness: &CscMatrix<f64>,
    field: &DVector<f64>,
    load_case: &LoadCase,
) -> DVector<f64> {
    let mut internal: DVector<f64> = DVector::zeros(field.len());
    for (row, col, value) in stiffness.triplet_iter() {
        internal[row] += value * field[col];
    }

    let loads = load_case.load_vector();
    let mut reactions: DVector<f64> = DVector::zeros(field.len());
    for (node, mask) in load_case.free_mask().iter().enumerate() {
        for axis in 0..DOF {
            if !mask[axis] {
                let dof = node * DOF + axis;
                reactions[dof] = internal[dof] - loads[dof];
            }
        }
    }
    reactions
}
