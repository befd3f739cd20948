//! Per-artifact skip decisions.

use std::collections::HashMap;
use std::fmt;

use kiln_cache::{compute_input_hash, ArtifactOutput, ExecutionCache, ExecutionStatus};
use kiln_common::ContentHash;
use kiln_graph::ArtifactSpec;
use serde::{Deserialize, Serialize};

/// Why an artifact will run or be skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The artifact has never been executed.
    NoCache,
    /// Its inputs changed since the cached execution.
    HashChanged,
    /// The cached execution failed and must be retried.
    PreviousFailed,
    /// The caller asked for it to run regardless of the cache.
    ForceRerun,
    /// Inputs are unchanged and the cached execution succeeded.
    UnchangedSuccess,
}

impl SkipReason {
    /// Snake-case label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoCache => "no_cache",
            Self::HashChanged => "hash_changed",
            Self::PreviousFailed => "previous_failed",
            Self::ForceRerun => "force_rerun",
            Self::UnchangedSuccess => "unchanged_success",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict on whether an artifact's cached result can be reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkipDecision {
    /// Whether execution can be skipped.
    pub can_skip: bool,
    /// Why.
    pub reason: SkipReason,
    /// Input hash computed for this run.
    pub current_hash: ContentHash,
    /// Hash of the cached execution when it differs from `current_hash`.
    pub previous_hash: Option<ContentHash>,
    /// Cached output when the artifact can be skipped.
    pub cached_result: Option<ArtifactOutput>,
}

impl SkipDecision {
    fn run(reason: SkipReason, current_hash: ContentHash) -> Self {
        Self {
            can_skip: false,
            reason,
            current_hash,
            previous_hash: None,
            cached_result: None,
        }
    }
}

/// Decides whether `spec` can reuse its cached result.
///
/// The checks apply in order: a forced rerun always runs, then a missing
/// entry, a changed input hash, and a failed previous execution each force a
/// run. Only an unchanged, successful entry is skipped.
pub fn should_skip(
    spec: &ArtifactSpec,
    cache: &ExecutionCache,
    dependency_hashes: &HashMap<String, ContentHash>,
    force_rerun: bool,
) -> SkipDecision {
    let current_hash = compute_input_hash(spec, dependency_hashes);

    if force_rerun {
        return SkipDecision::run(SkipReason::ForceRerun, current_hash);
    }

    let Some(entry) = cache.get(&spec.id) else {
        return SkipDecision::run(SkipReason::NoCache, current_hash);
    };

    if entry.input_hash != current_hash {
        return SkipDecision {
            previous_hash: Some(entry.input_hash),
            ..SkipDecision::run(SkipReason::HashChanged, current_hash)
        };
    }

    if entry.status == ExecutionStatus::Failed {
        return SkipDecision::run(SkipReason::PreviousFailed, current_hash);
    }

    SkipDecision {
        can_skip: true,
        reason: SkipReason::UnchangedSuccess,
        current_hash,
        previous_hash: None,
        cached_result: entry.result,
    }
}

#[cfg(test)]
mod tests {
    use kiln_cache::CacheEntry;

    use super::*;

    fn spec() -> ArtifactSpec {
        ArtifactSpec::new("UserModel", "User model", "class UserModel")
    }

    fn no_deps() -> HashMap<String, ContentHash> {
        HashMap::new()
    }

    fn cached_output() -> ArtifactOutput {
        ArtifactOutput {
            artifact_id: "UserModel".to_string(),
            content: "class UserModel: pass".to_string(),
            duration_ms: 5,
        }
    }

    #[test]
    fn no_cache_entry() {
        let cache = ExecutionCache::temporary().unwrap();
        let d = should_skip(&spec(), &cache, &no_deps(), false);
        assert!(!d.can_skip);
        assert_eq!(d.reason, SkipReason::NoCache);
        assert_eq!(d.current_hash, compute_input_hash(&spec(), &no_deps()));
    }

    #[test]
    fn unchanged_success_is_skipped_with_result() {
        let cache = ExecutionCache::temporary().unwrap();
        let hash = compute_input_hash(&spec(), &no_deps());
        cache
            .put(CacheEntry::completed(hash, cached_output()))
            .unwrap();

        let d = should_skip(&spec(), &cache, &no_deps(), false);
        assert!(d.can_skip);
        assert_eq!(d.reason, SkipReason::UnchangedSuccess);
        assert_eq!(d.cached_result, Some(cached_output()));
    }

    #[test]
    fn changed_hash_carries_previous() {
        let cache = ExecutionCache::temporary().unwrap();
        let stale = ContentHash::from_str_content("stale");
        cache.put(CacheEntry::completed(stale, cached_output())).unwrap();

        let d = should_skip(&spec(), &cache, &no_deps(), false);
        assert!(!d.can_skip);
        assert_eq!(d.reason, SkipReason::HashChanged);
        assert_eq!(d.previous_hash, Some(stale));
        assert!(d.cached_result.is_none());
    }

    #[test]
    fn previous_failure_is_retried() {
        let cache = ExecutionCache::temporary().unwrap();
        let hash = compute_input_hash(&spec(), &no_deps());
        cache
            .put(CacheEntry::failed("UserModel", hash, "boom", 3))
            .unwrap();

        let d = should_skip(&spec(), &cache, &no_deps(), false);
        assert!(!d.can_skip);
        assert_eq!(d.reason, SkipReason::PreviousFailed);
    }

    #[test]
    fn force_wins_over_valid_cache() {
        let cache = ExecutionCache::temporary().unwrap();
        let hash = compute_input_hash(&spec(), &no_deps());
        cache.put(CacheEntry::completed(hash, cached_output())).unwrap();

        let d = should_skip(&spec(), &cache, &no_deps(), true);
        assert!(!d.can_skip);
        assert_eq!(d.reason, SkipReason::ForceRerun);
    }

    #[test]
    fn hash_change_checked_before_failure() {
        let cache = ExecutionCache::temporary().unwrap();
        cache
            .put(CacheEntry::failed(
                "UserModel",
                ContentHash::from_str_content("old"),
                "boom",
                1,
            ))
            .unwrap();
        let d = should_skip(&spec(), &cache, &no_deps(), false);
        assert_eq!(d.reason, SkipReason::HashChanged);
    }

    #[test]
    fn reason_labels() {
        assert_eq!(SkipReason::UnchangedSuccess.to_string(), "unchanged_success");
        assert_eq!(SkipReason::ForceRerun.as_str(), "force_rerun");
    }
}
