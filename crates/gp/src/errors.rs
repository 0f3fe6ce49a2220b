use thiserror::Error;

/// A result type for GP regression and classification algorithms
pub type Result<T> = std::result::Result<T, GpError>;

/// An error when using [`GaussianProcess`](crate::GaussianProcess) or
/// [`GaussianProcessClassifier`](crate::GaussianProcessClassifier) algorithms
#[derive(Error, Debug)]
pub enum GpError {
    /// When kernel, training and query dimensions disagree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    /// When a hyperparameter gets a value violating its constraint or is unknown
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// When covariance factorization fails even after jitter escalation
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
    /// When an iterative procedure hits its iteration cap
    #[error("Optimization did not converge after {iterations} iterations (objective = {objective})")]
    OptimizationNonConvergence {
        /// Number of iterations (or evaluations) performed
        iterations: usize,
        /// Objective value at the returned point
        objective: f64,
    },
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When serialization fails
    #[cfg(feature = "persistent")]
    #[error("Save error: {0}")]
    SaveError(#[from] serde_json::Error),
    /// When error during loading
    #[error("Load IO error")]
    LoadIoError(#[from] std::io::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
