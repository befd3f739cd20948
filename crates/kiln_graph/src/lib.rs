//! Artifact specifications and the dependency graph they form.
//!
//! The planning layer produces an [`ArtifactGraph`] of [`ArtifactSpec`]s; the
//! execution engine only ever reads it. The graph is acyclic by construction:
//! every insertion that would close a cycle is rejected.

#![warn(missing_docs)]

pub mod error;
pub mod graph;
pub mod spec;

pub use error::GraphError;
pub use graph::ArtifactGraph;
pub use spec::ArtifactSpec;
