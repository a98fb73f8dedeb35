use thiserror::Error;

/// Hard failures. These are caller mistakes or numerical preconditions that are
/// detected before a solver starts iterating; everything else is reported through
/// [`crate::SolutionStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    #[error("Matrix is singular or nearly singular")]
    SingularMatrix,
    #[error("Matrix is not positive definite")]
    NotPositiveDefinite,
    #[error("Dimension mismatch in {context}: expected {expected}, found {found}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        found: usize,
    },
    #[error("Quadratic term is not symmetric at ({row}, {col})")]
    AsymmetricMatrix { row: usize, col: usize },
    #[error("Invalid bounds for variable {variable}: [{lower}, {upper}]")]
    InvalidBounds {
        variable: String,
        lower: f64,
        upper: f64,
    },
    #[error("Non-finite value in {context}")]
    NonFiniteValue { context: String },
}

impl SolverError {
    pub(crate) fn dimension(context: impl Into<String>, expected: usize, found: usize) -> Self {
        SolverError::DimensionMismatch {
            context: context.into(),
            expected,
            found,
        }
    }

    pub(crate) fn non_finite(context: impl Into<String>) -> Self {
        SolverError::NonFiniteValue {
            context: context.into(),
        }
    }
}
