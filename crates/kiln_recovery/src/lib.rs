//! Durable snapshots of failed runs.
//!
//! When a run fails, the orchestrating layer turns its per-artifact outcomes
//! into a [`RecoveryState`] and hands it to a [`RecoveryManager`], which keeps
//! one JSON document per goal under a state directory. Documents move to an
//! `archive/` subdirectory once resolved, or are deleted when abandoned.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod manager;
pub mod state;
pub mod summary;
mod timestamp;

pub use artifact::{ArtifactStatus, RecoveryArtifact};
pub use error::RecoveryError;
pub use manager::RecoveryManager;
pub use state::{ExecutedArtifact, FailedRun, GateResult, RecoveryState};
pub use summary::RecoverySummary;
