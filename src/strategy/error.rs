//! Model fitting errors

use thiserror::Error;

/// Errors raised while fitting or applying a statistical model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// Too few usable rows to fit
    #[error("{model}: insufficient rows to fit (requires {required}, got {actual})")]
    InsufficientRows {
        model: &'static str,
        required: usize,
        actual: usize,
    },

    /// Row width differs from the fitted feature count
    #[error("{model}: dimension mismatch (expected {expected} features, got {actual})")]
    DimensionMismatch {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Training rows all carry zero weight or a single class cannot be split
    #[error("{model}: degenerate training set: {reason}")]
    DegenerateTrainingSet { model: &'static str, reason: String },
}

impl ModelError {
    /// Row-count diagnostic, when the failure is about data volume
    pub fn row_counts(&self) -> Option<(usize, usize)> {
        match self {
            ModelError::InsufficientRows { required, actual, .. } => Some((*required, *actual)),
            _ => None,
        }
    }
}
