//! Execution planning.
//!
//! Walks the graph in dependency order, computing each artifact's input hash
//! from the hashes already computed for its dependencies, and partitions the
//! artifacts into those that run and those that reuse the cache.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use kiln_cache::ExecutionCache;
use kiln_common::ContentHash;
use kiln_graph::ArtifactGraph;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::decision::{should_skip, SkipDecision, SkipReason};

/// Which artifacts run and which are skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    /// Artifacts to run, in dependency order.
    pub to_execute: Vec<String>,
    /// Artifacts whose cached result is reused, in dependency order.
    pub to_skip: Vec<String>,
    /// The decision made for every artifact.
    pub decisions: BTreeMap<String, SkipDecision>,
    /// Input hash of every artifact.
    pub computed_hashes: BTreeMap<String, ContentHash>,
    /// Artifacts whose requires name ids missing from the graph, with those ids.
    pub unsatisfied: BTreeMap<String, Vec<String>>,
}

impl ExecutionPlan {
    /// Number of planned artifacts.
    pub fn total(&self) -> usize {
        self.to_execute.len() + self.to_skip.len()
    }

    /// Share of artifacts reused from the cache, as a percentage.
    pub fn skip_percentage(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.to_skip.len() as f64 / self.total() as f64 * 100.0
    }

    /// Returns `true` if nothing needs to run.
    pub fn is_noop(&self) -> bool {
        self.to_execute.is_empty()
    }

    /// Returns `true` if `id` is scheduled to run.
    pub fn will_execute(&self, id: &str) -> bool {
        self.decisions.get(id).is_some_and(|d| !d.can_skip)
    }

    /// Builds a serializable summary of the plan.
    pub fn report(&self) -> PlanReport {
        let artifacts = self
            .to_execute
            .iter()
            .chain(&self.to_skip)
            .filter_map(|id| {
                let decision = self.decisions.get(id)?;
                Some(PlannedArtifact {
                    id: id.clone(),
                    action: if decision.can_skip { "skip" } else { "execute" }.to_string(),
                    reason: decision.reason,
                    current_hash: decision.current_hash.to_string(),
                    previous_hash: decision.previous_hash.map(|h| h.to_string()),
                    unsatisfied: self.unsatisfied.get(id).cloned().unwrap_or_default(),
                })
            })
            .collect();

        PlanReport {
            total: self.total(),
            to_execute: self.to_execute.len(),
            to_skip: self.to_skip.len(),
            skip_percentage: self.skip_percentage(),
            artifacts,
        }
    }
}

/// Serializable plan summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReport {
    /// Number of planned artifacts.
    pub total: usize,
    /// Number of artifacts that run.
    pub to_execute: usize,
    /// Number of artifacts reused from the cache.
    pub to_skip: usize,
    /// Share reused, as a percentage.
    pub skip_percentage: f64,
    /// Per-artifact detail, runs first.
    pub artifacts: Vec<PlannedArtifact>,
}

/// One artifact's line in a [`PlanReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedArtifact {
    /// Artifact id.
    pub id: String,
    /// `"execute"` or `"skip"`.
    pub action: String,
    /// Why.
    pub reason: SkipReason,
    /// Input hash for this run, hex.
    pub current_hash: String,
    /// Hash of the stale cached execution, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    /// Required ids missing from the graph.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsatisfied: Vec<String>,
}

/// Plans a run of `graph` against `cache`.
///
/// Artifacts named in `force_rerun` run regardless of the cache. Planning only
/// reads the cache, so planning twice without executing in between yields the
/// same plan.
pub fn plan_execution(
    graph: &ArtifactGraph,
    cache: &ExecutionCache,
    force_rerun: &BTreeSet<String>,
) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();

    for id in graph.topological_order() {
        let Some(spec) = graph.get(id) else {
            continue;
        };

        let dependency_hashes: HashMap<String, ContentHash> = graph
            .dependencies(id)
            .into_iter()
            .filter_map(|dep| {
                plan.computed_hashes
                    .get(dep)
                    .map(|hash| (dep.to_string(), *hash))
            })
            .collect();

        let decision = should_skip(spec, cache, &dependency_hashes, force_rerun.contains(id));
        plan.computed_hashes
            .insert(id.to_string(), decision.current_hash);

        let missing = graph.unresolved(id);
        if !missing.is_empty() {
            plan.unsatisfied.insert(
                id.to_string(),
                missing.into_iter().map(str::to_string).collect(),
            );
        }

        if decision.can_skip {
            plan.to_skip.push(id.to_string());
        } else {
            plan.to_execute.push(id.to_string());
        }
        plan.decisions.insert(id.to_string(), decision);
    }

    info!(
        total = plan.total(),
        execute = plan.to_execute.len(),
        skip = plan.to_skip.len(),
        "planned incremental run"
    );
    plan
}

#[cfg(test)]
mod tests {
    use kiln_cache::{ArtifactOutput, CacheEntry};
    use kiln_graph::ArtifactSpec;

    use super::*;

    fn chain() -> ArtifactGraph {
        ArtifactGraph::from_specs([
            ArtifactSpec::new("A", "base", "a"),
            ArtifactSpec::new("B", "middle", "b").requiring("A"),
            ArtifactSpec::new("C", "top", "c").requiring("B"),
        ])
        .unwrap()
    }

    fn complete_all(plan: &ExecutionPlan, cache: &ExecutionCache) {
        for (id, hash) in &plan.computed_hashes {
            cache
                .put(CacheEntry::completed(
                    *hash,
                    ArtifactOutput {
                        artifact_id: id.clone(),
                        content: format!("content of {id}"),
                        duration_ms: 1,
                    },
                ))
                .unwrap();
        }
    }

    #[test]
    fn empty_cache_executes_everything_in_order() {
        let cache = ExecutionCache::temporary().unwrap();
        let plan = plan_execution(&chain(), &cache, &BTreeSet::new());
        assert_eq!(plan.to_execute, vec!["A", "B", "C"]);
        assert!(plan.to_skip.is_empty());
        assert_eq!(plan.total(), 3);
        assert!(plan
            .decisions
            .values()
            .all(|d| d.reason == SkipReason::NoCache));
    }

    #[test]
    fn warm_cache_skips_everything() {
        let cache = ExecutionCache::temporary().unwrap();
        let graph = chain();
        let first = plan_execution(&graph, &cache, &BTreeSet::new());
        complete_all(&first, &cache);

        let second = plan_execution(&graph, &cache, &BTreeSet::new());
        assert!(second.is_noop());
        assert_eq!(second.to_skip, vec!["A", "B", "C"]);
        assert!((second.skip_percentage() - 100.0).abs() < f64::EPSILON);
        assert_eq!(
            second.decisions["B"].cached_result.as_ref().unwrap().content,
            "content of B"
        );
    }

    #[test]
    fn dependency_hashes_fold_transitively() {
        let cache = ExecutionCache::temporary().unwrap();
        let plan = plan_execution(&chain(), &cache, &BTreeSet::new());

        let mut edited = ArtifactGraph::new();
        edited
            .add(ArtifactSpec::new("A", "base, edited", "a"))
            .unwrap();
        edited
            .add(ArtifactSpec::new("B", "middle", "b").requiring("A"))
            .unwrap();
        edited
            .add(ArtifactSpec::new("C", "top", "c").requiring("B"))
            .unwrap();
        let replanned = plan_execution(&edited, &cache, &BTreeSet::new());

        for id in ["A", "B", "C"] {
            assert_ne!(plan.computed_hashes[id], replanned.computed_hashes[id], "{id}");
        }
    }

    #[test]
    fn force_only_affects_named_artifact() {
        let cache = ExecutionCache::temporary().unwrap();
        let graph = chain();
        complete_all(&plan_execution(&graph, &cache, &BTreeSet::new()), &cache);

        let force = BTreeSet::from(["B".to_string()]);
        let plan = plan_execution(&graph, &cache, &force);
        assert_eq!(plan.to_execute, vec!["B"]);
        assert_eq!(plan.to_skip, vec!["A", "C"]);
        assert_eq!(plan.decisions["B"].reason, SkipReason::ForceRerun);
        assert!(plan.will_execute("B"));
        assert!(!plan.will_execute("C"));
    }

    #[test]
    fn unsatisfied_requires_are_noted() {
        let cache = ExecutionCache::temporary().unwrap();
        let graph = ArtifactGraph::from_specs([
            ArtifactSpec::new("A", "d", "c"),
            ArtifactSpec::new("B", "d", "c").requiring("A").requiring("Ghost"),
        ])
        .unwrap();
        let plan = plan_execution(&graph, &cache, &BTreeSet::new());
        assert_eq!(plan.unsatisfied["B"], vec!["Ghost"]);
        assert!(!plan.unsatisfied.contains_key("A"));
    }

    #[test]
    fn report_summarizes_decisions() {
        let cache = ExecutionCache::temporary().unwrap();
        let graph = chain();
        complete_all(&plan_execution(&graph, &cache, &BTreeSet::new()), &cache);
        let plan = plan_execution(&graph, &cache, &BTreeSet::from(["A".to_string()]));

        let report = plan.report();
        assert_eq!(report.total, 3);
        assert_eq!(report.to_execute, 1);
        assert_eq!(report.artifacts[0].id, "A");
        assert_eq!(report.artifacts[0].action, "execute");
        assert_eq!(report.artifacts[0].reason, SkipReason::ForceRerun);
        assert_eq!(report.artifacts[1].action, "skip");
        assert_eq!(report.artifacts[0].current_hash.len(), 64);

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"force_rerun\""));
        assert!(!json.contains("previous_hash"));
    }

    #[test]
    fn empty_graph_plan() {
        let cache = ExecutionCache::temporary().unwrap();
        let plan = plan_execution(&ArtifactGraph::new(), &cache, &BTreeSet::new());
        assert_eq!(plan.total(), 0);
        assert_eq!(plan.skip_percentage(), 0.0);
    }
}
