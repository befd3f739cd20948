//! Persistent execution cache and input hashing.
//!
//! This crate fingerprints artifacts from their own fields plus their
//! dependencies' fingerprints, and stores the latest execution outcome per
//! artifact in an embedded sled database so unchanged work can be skipped on
//! the next run.

#![warn(missing_docs)]

pub mod cache;
pub mod entry;
pub mod error;
pub mod hasher;
pub mod record;

pub use cache::ExecutionCache;
pub use entry::{
    ArtifactOutput, CacheEntry, CacheStats, ExecutionStatus, GoalRecord, RunRecord, RunStatus,
};
pub use error::CacheError;
pub use hasher::{compute_input_hash, compute_spec_hash};
