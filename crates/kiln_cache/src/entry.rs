//! Records stored in the execution cache.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use kiln_common::ContentHash;
use serde::{Deserialize, Serialize};

/// Outcome of the latest execution of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The artifact was produced successfully.
    Completed,
    /// Production failed.
    Failed,
}

impl ExecutionStatus {
    /// Lowercase label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Content produced by a successful execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactOutput {
    /// The artifact that produced this output.
    pub artifact_id: String,
    /// The produced content.
    pub content: String,
    /// Wall time spent producing it.
    pub duration_ms: u64,
}

/// The cache's record for one artifact id.
///
/// Only the most recent execution is kept per id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Artifact id.
    pub artifact_id: String,
    /// Input hash the artifact was executed with.
    pub input_hash: ContentHash,
    /// Hash of the artifact definition alone, when known.
    pub spec_hash: Option<ContentHash>,
    /// Outcome of the execution.
    pub status: ExecutionStatus,
    /// Output of a completed execution.
    pub result: Option<ArtifactOutput>,
    /// Error message of a failed execution.
    pub error: Option<String>,
    /// When the execution finished.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub executed_at: DateTime<Utc>,
    /// Wall time of the execution.
    pub execution_time_ms: u64,
    /// How many times this entry has let a run skip the artifact.
    pub skip_count: u64,
}

impl CacheEntry {
    /// Builds an entry for a successful execution.
    pub fn completed(input_hash: ContentHash, output: ArtifactOutput) -> Self {
        Self {
            artifact_id: output.artifact_id.clone(),
            input_hash,
            spec_hash: None,
            status: ExecutionStatus::Completed,
            execution_time_ms: output.duration_ms,
            result: Some(output),
            error: None,
            executed_at: Utc::now(),
            skip_count: 0,
        }
    }

    /// Builds an entry for a failed execution.
    pub fn failed(
        artifact_id: impl Into<String>,
        input_hash: ContentHash,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            artifact_id: artifact_id.into(),
            input_hash,
            spec_hash: None,
            status: ExecutionStatus::Failed,
            result: None,
            error: Some(error.into()),
            executed_at: Utc::now(),
            execution_time_ms,
            skip_count: 0,
        }
    }

    /// Attaches the definition hash.
    pub fn with_spec_hash(mut self, spec_hash: ContentHash) -> Self {
        self.spec_hash = Some(spec_hash);
        self
    }

    /// Returns `true` if the execution succeeded.
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Lifecycle state of an execution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run has started and not yet finished.
    Running,
    /// Every attempted artifact completed.
    Completed,
    /// At least one artifact failed or was blocked.
    Failed,
}

/// Bookkeeping for one executor run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run identifier.
    pub run_id: String,
    /// When the run started.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    /// When the run finished, if it has.
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of artifacts in the run's graph.
    pub total_artifacts: usize,
    /// Artifacts executed successfully.
    pub executed: usize,
    /// Artifacts skipped thanks to the cache.
    pub skipped: usize,
    /// Artifacts that failed.
    pub failed: usize,
    /// Current state.
    pub status: RunStatus,
}

/// Artifacts produced for a goal, keyed by goal hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    /// Hash of the goal text.
    pub goal_hash: String,
    /// Artifacts produced for the goal, sorted.
    pub artifact_ids: Vec<String>,
    /// When the goal last ran.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub executed_at: DateTime<Utc>,
    /// Wall time of the goal's run, when known.
    pub execution_time_ms: Option<u64>,
}

/// Aggregate statistics over the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entry count per status.
    pub by_status: BTreeMap<ExecutionStatus, usize>,
    /// Number of cached artifacts.
    pub total_artifacts: usize,
    /// Sum of skip counts across entries.
    pub total_skips: u64,
    /// Mean execution time of completed entries.
    pub avg_execution_time_ms: f64,
    /// Skips multiplied by the average execution time.
    pub estimated_time_saved_ms: f64,
    /// Percentage of artifact resolutions served from cache.
    pub cache_hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> ArtifactOutput {
        ArtifactOutput {
            artifact_id: "UserModel".to_string(),
            content: "class UserModel: ...".to_string(),
            duration_ms: 42,
        }
    }

    #[test]
    fn completed_entry_carries_output() {
        let hash = ContentHash::from_str_content("h");
        let entry = CacheEntry::completed(hash, output());
        assert_eq!(entry.artifact_id, "UserModel");
        assert!(entry.is_completed());
        assert_eq!(entry.execution_time_ms, 42);
        assert!(entry.error.is_none());
        assert_eq!(entry.skip_count, 0);
    }

    #[test]
    fn failed_entry_carries_error() {
        let entry = CacheEntry::failed("A", ContentHash::from_str_content("h"), "boom", 7);
        assert!(!entry.is_completed());
        assert_eq!(entry.error.as_deref(), Some("boom"));
        assert!(entry.result.is_none());
    }

    #[test]
    fn spec_hash_attached() {
        let spec_hash = ContentHash::from_str_content("spec");
        let entry =
            CacheEntry::completed(ContentHash::from_str_content("h"), output()).with_spec_hash(spec_hash);
        assert_eq!(entry.spec_hash, Some(spec_hash));
    }

    #[test]
    fn status_labels() {
        assert_eq!(ExecutionStatus::Completed.as_str(), "completed");
        assert_eq!(ExecutionStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn entry_survives_record_encoding() {
        let entry = CacheEntry::completed(ContentHash::from_str_content("h"), output());
        let raw = crate::record::encode(&entry).unwrap();
        let back: CacheEntry = crate::record::decode("UserModel", &raw).unwrap();
        // Timestamps are stored at millisecond precision.
        assert_eq!(back.executed_at.timestamp_millis(), entry.executed_at.timestamp_millis());
        assert_eq!(back.result, entry.result);
        assert_eq!(back.input_hash, entry.input_hash);
    }
}
