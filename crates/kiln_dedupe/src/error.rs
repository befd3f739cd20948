//! Error type returned by deduplicated work.

/// Failure of a deduplicated call, shared by the leader and all waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DedupeError<E> {
    /// The work ran and returned an error.
    #[error("{0}")]
    Failed(E),

    /// The caller running the work panicked or was dropped before finishing.
    #[error("work for '{key}' was abandoned before completing")]
    Cancelled {
        /// The deduplication key.
        key: String,
    },
}

impl<E> DedupeError<E> {
    /// Returns the work's own error, or `None` if the work was abandoned.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Failed(e) => Some(e),
            Self::Cancelled { .. } => None,
        }
    }

    /// Returns `true` if the work was abandoned.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
