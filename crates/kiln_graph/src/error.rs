//! Error types for graph construction.

/// Errors raised while building an [`ArtifactGraph`](crate::ArtifactGraph).
///
/// These are input errors: they fail fast at graph-build time, before any
/// planning or execution happens.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// Two artifacts share the same id.
    #[error("artifact '{0}' already exists in graph")]
    DuplicateArtifact(String),

    /// Adding the artifact would close a dependency cycle.
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle {
        /// The artifacts along the cycle, starting and ending at the same id.
        path: Vec<String>,
    },

    /// An artifact has an empty id.
    #[error("artifact id must not be empty")]
    EmptyId,

    /// A graph document could not be parsed.
    #[error("failed to parse artifact graph: {0}")]
    Parse(String),
}
