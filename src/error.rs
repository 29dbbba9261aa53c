//! Error types for the training engine.

use thiserror::Error;

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, MinetError>;

/// Errors raised by tensors, layers, losses, datasets and the training driver.
///
/// Shape and protocol errors are never recovered inside the engine: they abort
/// the operation that detected them and, through `?`, the enclosing training step.
#[derive(Debug, Error)]
pub enum MinetError {
    /// Operand dimensions are incompatible
    #[error("Shape mismatch in {op}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        op: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Backward called with a foreign cache or a wrongly shaped gradient
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Ground-truth entry is not a valid class index
    #[error("Invalid class label {value} at row {row} (expected an integer in 0..{classes})")]
    InvalidLabel { row: usize, value: f64, classes: usize },

    /// Invalid hyperparameter or initializer settings
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed dataset file
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Dataset has no samples to iterate over
    #[error("Dataset is empty")]
    EmptyDataset,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON configuration error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MinetError {
    pub(crate) fn shape(
        op: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    ) -> Self {
        MinetError::ShapeMismatch {
            op,
            expected,
            actual,
        }
    }
}
