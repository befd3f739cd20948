//! Incremental execution of artifact graphs.
//!
//! Plans which artifacts can reuse a cached result and which must run, then
//! runs the rest in dependency order through a caller-supplied creation
//! function, recording every outcome in the [`ExecutionCache`].
//!
//! [`ExecutionCache`]: kiln_cache::ExecutionCache

#![warn(missing_docs)]

pub mod decision;
pub mod error;
pub mod executor;
pub mod impact;
pub mod plan;
pub mod result;

pub use decision::{should_skip, SkipDecision, SkipReason};
pub use error::{CreationError, ExecError};
pub use executor::{ExecutorOptions, IncrementalExecutor};
pub use impact::{impact_analysis, ImpactReport};
pub use plan::{plan_execution, ExecutionPlan, PlanReport, PlannedArtifact};
pub use result::ExecutionResult;
