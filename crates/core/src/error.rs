//! Error types for Vista views.

use thiserror::Error;

/// Result type alias for Vista operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for view construction and maintenance.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Index outside the bounds of a collection or derived view.
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    /// Two sources of one operator are pinned to different notification
    /// contexts.
    #[error("sources are pinned to conflicting notification contexts")]
    ConflictingContexts,
    /// Operation attempted on a disposed view or evaluator.
    #[error("operation on a disposed view")]
    Disposed,
    /// A per-element computation failed.
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
}

impl Error {
    /// Creates an evaluation error from any displayable message.
    pub fn evaluation(message: impl Into<String>) -> Self {
        Error::Evaluation {
            message: message.into(),
        }
    }
}
