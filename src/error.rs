use thiserror::Error;

/// Errors raised while building, solving or optimizing a truss model
#[derive(Debug, Error)]
pub enum TrussError {
    /// Invalid topology or shape mismatch against the topology
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Reduced stiffness matrix cannot be factorized
    #[error("Singular system: {0}")]
    SingularSystem(String),

    /// Starting design violates bounds or the volume constraint
    #[error("Infeasible start: {0}")]
    InfeasibleStart(String),

    #[error("Surrogate error: {0}")]
    Surrogate(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Optimizer error: {0}")]
    Optimizer(String),
}

impl From<argmin::core::Error> for TrussError {
    fn from(err: argmin::core::Error) -> Self {
        TrussError::Optimizer(err.to_string())
    }
}

pub type TrussResult<T> = Result<T, TrussError>;
