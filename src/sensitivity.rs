//! Compliance objective, its closed-form design sensitivity, bar stresses and
//! the volume functional.
//!
//! The gradient `dC/dA_i = -σ_i² l_i / E_i` is the adjoint result for the
//! exact, self-adjoint linear solve. An `Evaluator` backed by a surrogate
//! applies the same formula to predicted displacements; that value is a proxy
//! and not the derivative of the surrogate's own output.

use nalgebra::DVector;

use crate::{
    datatypes::{node_displacement, Geometry, LoadCase},
    error::TrussError,
    solver::{check_design, scatter_displacements, DisplacementSource},
};

/// Everything derived from one displacement field
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// `Σ U·F` over every DOF
    pub compliance: f64,
    /// Derivative of compliance with respect to each bar area
    pub gradient: Vec<f64>,
    /// Full displacement field, zero at constrained DOFs
    pub displacements: DVector<f64>,
    /// Axial force per bar, tension positive
    pub axial_forces: Vec<f64>,
    /// Axial stress per bar
    pub stress: Vec<f64>,
}

/// Evaluates designs of one geometry and load case with a chosen
/// displacement source
#[derive(Debug, Clone)]
pub struct Evaluator<'a, S> {
    geometry: &'a Geometry,
    load_case: &'a LoadCase,
    source: S,
}

impl<'a, S: DisplacementSource> Evaluator<'a, S> {
    pub fn new(geometry: &'a Geometry, load_case: &'a LoadCase, source: S) -> Evaluator<'a, S> {
        Evaluator {
            geometry,
            load_case,
            source,
        }
    }

    pub fn geometry(&self) -> &'a Geometry {
        self.geometry
    }

    pub fn load_case(&self) -> &'a LoadCase {
        self.load_case
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Computes compliance, its gradient, displacements and stresses
    ///
    /// # Arguments
    /// * `areas` - Cross-section area of each bar
    pub fn evaluate(&self, areas: &[f64]) -> Result<Evaluation, TrussError> {
        check_design(self.geometry, areas)?;

        let reduced = self
            .source
            .free_displacements(self.geometry, self.load_case, areas)?;
        if reduced.len() != self.load_case.free_count() {
            return Err(TrussError::Geometry(format!(
                "{} displacement source returned {} values for {} free DOFs",
                self.source.name(),
                reduced.len(),
                self.load_case.free_count()
            )));
        }

        let displacements = scatter_displacements(
            self.load_case.free_dofs(),
            &reduced,
            self.geometry.dof_count(),
        );

        Ok(post_process(self.geometry, self.load_case, areas, displacements))
    }

    pub fn volume(&self, areas: &[f64]) -> (f64, Vec<f64>) {
        volume(self.geometry, areas)
    }
}

/// Derives compliance, gradient, axial forces and stresses from a field
fn post_process(
    geometry: &Geometry,
    load_case: &LoadCase,
    areas: &[f64],
    displacements: DVector<f64>,
) -> Evaluation {
    let compliance = displacements.dot(&load_case.load_vector());
    let youngs_modulus = load_case.youngs_modulus();

    let bar_count = geometry.bar_count();
    let mut axial_forces = Vec::with_capacity(bar_count);
    let mut stress = Vec::with_capacity(bar_count);
    let mut gradient = Vec::with_capacity(bar_count);

    for (i, bar) in geometry.bars().iter().enumerate() {
        let length = geometry.lengths()[i];
        let elongation = (node_displacement(&displacements, bar.nodes[1])
            - node_displacement(&displacements, bar.nodes[0]))
        .dot(geometry.cosine(i));

        let axial = youngs_modulus[i] * areas[i] / length * elongation;
        let sigma = axial / areas[i];

        axial_forces.push(axial);
        stress.push(sigma);
        gradient.push(-sigma * sigma / youngs_modulus[i] * length);
    }

    Evaluation {
        compliance,
        gradient,
        displacements,
        axial_forces,
        stress,
    }
}

/// Total material volume `Σ A_i l_i` and its gradient, which is the vector
/// of bar lengths
pub fn volume(geometry: &Geometry, areas: &[f64]) -> (f64, Vec<f64>) {
    let lengths = geometry.lengths();
    let total = areas.iter().zip(lengths).map(|(a, l)| a * l).sum();
    (total, lengths.to_vec())
}
