//! Outcome of an executor run.

use std::collections::BTreeMap;

use kiln_cache::ArtifactOutput;
use serde::{Deserialize, Serialize};

/// What happened to every artifact during a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Artifacts that ran and succeeded.
    pub completed: BTreeMap<String, ArtifactOutput>,
    /// Artifacts that ran and failed, with their error messages.
    pub failed: BTreeMap<String, String>,
    /// Artifacts that reused their cached result.
    pub skipped: BTreeMap<String, Option<ArtifactOutput>>,
    /// Artifacts never attempted, with the dependencies that held them back.
    pub blocked: BTreeMap<String, Vec<String>>,
    /// Cache writes that failed during the run.
    pub storage_errors: Vec<String>,
    /// Short identifier of the run.
    pub run_id: String,
    /// Wall time of the run.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Returns `true` if no artifact failed.
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns `true` if no artifact failed and none was blocked.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    /// Number of artifacts accounted for.
    pub fn total(&self) -> usize {
        self.completed.len() + self.failed.len() + self.skipped.len() + self.blocked.len()
    }

    /// Produced content for an artifact, whether it ran or was skipped.
    pub fn content(&self, id: &str) -> Option<&str> {
        self.completed
            .get(id)
            .or_else(|| self.skipped.get(id).and_then(Option::as_ref))
            .map(|o| o.content.as_str())
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "run {}: {} completed, {} skipped, {} failed, {} blocked in {}ms",
            self.run_id,
            self.completed.len(),
            self.skipped.len(),
            self.failed.len(),
            self.blocked.len(),
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(id: &str) -> ArtifactOutput {
        ArtifactOutput {
            artifact_id: id.to_string(),
            content: format!("<{id}>"),
            duration_ms: 1,
        }
    }

    #[test]
    fn empty_result_is_successful() {
        let r = ExecutionResult::default();
        assert!(r.success());
        assert!(r.is_complete());
        assert_eq!(r.total(), 0);
    }

    #[test]
    fn blocked_is_not_a_failure() {
        let mut r = ExecutionResult::default();
        r.blocked.insert("C".to_string(), vec!["B".to_string()]);
        assert!(r.success());
        assert!(!r.is_complete());
    }

    #[test]
    fn failure_breaks_success() {
        let mut r = ExecutionResult::default();
        r.failed.insert("B".to_string(), "boom".to_string());
        assert!(!r.success());
    }

    #[test]
    fn content_from_completed_or_skipped() {
        let mut r = ExecutionResult::default();
        r.completed.insert("A".to_string(), output("A"));
        r.skipped.insert("B".to_string(), Some(output("B")));
        r.skipped.insert("C".to_string(), None);
        assert_eq!(r.content("A"), Some("<A>"));
        assert_eq!(r.content("B"), Some("<B>"));
        assert_eq!(r.content("C"), None);
        assert_eq!(r.total(), 3);
    }

    #[test]
    fn summary_mentions_counts() {
        let mut r = ExecutionResult {
            run_id: "abcd1234".to_string(),
            ..ExecutionResult::default()
        };
        r.failed.insert("B".to_string(), "boom".to_string());
        let s = r.summary();
        assert!(s.contains("abcd1234"));
        assert!(s.contains("1 failed"));
    }
}
