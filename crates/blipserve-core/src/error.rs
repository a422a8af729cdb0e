use thiserror::Error;

/// Why a single request in a batch could not be answered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferError {
    #[error("missing input tensor {0}")]
    MissingInput(String),

    #[error("input {name} must be {expected}, got {actual}")]
    WrongType {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("input {name} is malformed: {reason}")]
    MalformedInput { name: String, reason: String },

    #[error("inputs disagree on element count: {0}")]
    CountMismatch(String),

    #[error("input {name} element {index} is not valid UTF-8")]
    InvalidText { name: String, index: usize },

    #[error("input {name} element {index} is not a usable image: {reason}")]
    InvalidImage {
        name: String,
        index: usize,
        reason: String,
    },

    #[error("model invocation failed: {0}")]
    Model(String),

    #[error("failed to encode output {name}: {reason}")]
    Output { name: String, reason: String },

    #[error("model is not initialized")]
    NotInitialized,
}
