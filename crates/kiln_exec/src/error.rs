//! Error types for planning and execution.

use kiln_cache::CacheError;
use kiln_dedupe::DedupeError;

/// Errors returned by executor queries.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// The requested artifact is not in the graph.
    #[error("unknown artifact '{0}'")]
    UnknownArtifact(String),

    /// A cache write failed.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Failure reported by a creation function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CreationError {
    /// The creation function ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The creation call was abandoned before it produced a result.
    #[error("creation was cancelled")]
    Cancelled,
}

impl CreationError {
    /// Creates a [`CreationError::Failed`] with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<DedupeError<CreationError>> for CreationError {
    fn from(err: DedupeError<CreationError>) -> Self {
        match err {
            DedupeError::Failed(inner) => inner,
            DedupeError::Cancelled { .. } => Self::Cancelled,
        }
    }
}
