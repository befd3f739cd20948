//! The incremental executor.
//!
//! Runs a plan wave by wave: every artifact in a wave has all of its
//! dependencies settled by earlier waves, so artifacts within a wave may run
//! in parallel. The blocking and async entry points share the same
//! bookkeeping and differ only in how they call the creation function.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::{Duration, Instant};

use kiln_cache::{compute_spec_hash, ArtifactOutput, CacheEntry, ExecutionCache, RunRecord, RunStatus};
use kiln_common::ContentHash;
use kiln_dedupe::{AsyncWorkDeduper, WorkDeduper};
use kiln_graph::{ArtifactGraph, ArtifactSpec};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CreationError, ExecError};
use crate::impact::{impact_analysis, ImpactReport};
use crate::plan::{plan_execution, ExecutionPlan};
use crate::result::ExecutionResult;

/// Tuning for an [`IncrementalExecutor`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    /// Run the artifacts of one wave on the rayon pool instead of one by one.
    /// Only affects [`IncrementalExecutor::execute`].
    pub parallel: bool,
}

/// Executes an artifact graph, reusing cached results where inputs are
/// unchanged.
pub struct IncrementalExecutor<'a> {
    graph: &'a ArtifactGraph,
    cache: &'a ExecutionCache,
    deduper: Option<&'a WorkDeduper<String, String, CreationError>>,
    async_deduper: Option<&'a AsyncWorkDeduper<String, String, CreationError>>,
    options: ExecutorOptions,
}

impl<'a> IncrementalExecutor<'a> {
    /// Creates an executor over `graph` backed by `cache`.
    pub fn new(graph: &'a ArtifactGraph, cache: &'a ExecutionCache) -> Self {
        Self {
            graph,
            cache,
            deduper: None,
            async_deduper: None,
            options: ExecutorOptions::default(),
        }
    }

    /// Routes blocking creation calls through `deduper`.
    pub fn with_deduper(mut self, deduper: &'a WorkDeduper<String, String, CreationError>) -> Self {
        self.deduper = Some(deduper);
        self
    }

    /// Routes async creation calls through `deduper`.
    pub fn with_async_deduper(
        mut self,
        deduper: &'a AsyncWorkDeduper<String, String, CreationError>,
    ) -> Self {
        self.async_deduper = Some(deduper);
        self
    }

    /// Sets the executor options.
    pub fn with_options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// The graph being executed.
    pub fn graph(&self) -> &ArtifactGraph {
        self.graph
    }

    /// Plans a run without executing anything.
    pub fn plan_execution(&self, force_rerun: &BTreeSet<String>) -> ExecutionPlan {
        plan_execution(self.graph, self.cache, force_rerun)
    }

    /// Reports which artifacts a change to `id` would invalidate.
    pub fn impact_analysis(&self, id: &str) -> Result<ImpactReport, ExecError> {
        impact_analysis(self.graph, id)
    }

    /// Plans and executes a run, blocking the calling thread.
    pub fn execute<F>(&self, force_rerun: &BTreeSet<String>, creation_fn: F) -> ExecutionResult
    where
        F: Fn(&ArtifactSpec) -> Result<String, CreationError> + Sync,
    {
        let plan = self.plan_execution(force_rerun);
        self.execute_plan(&plan, creation_fn)
    }

    /// Executes a previously computed plan, blocking the calling thread.
    ///
    /// An artifact runs only after every dependency has settled. If a
    /// dependency failed or was itself blocked, the artifact is reported as
    /// blocked and never attempted; unrelated artifacts keep running.
    pub fn execute_plan<F>(&self, plan: &ExecutionPlan, creation_fn: F) -> ExecutionResult
    where
        F: Fn(&ArtifactSpec) -> Result<String, CreationError> + Sync,
    {
        let mut ledger = RunLedger::begin(self.cache, plan);

        for wave in self.graph.execution_waves() {
            let ready = ledger.admit(self.graph, &wave);
            if ready.is_empty() {
                continue;
            }
            debug!(artifacts = ready.len(), "executing wave");

            let outcomes: Vec<_> = if self.options.parallel && ready.len() > 1 {
                ready
                    .par_iter()
                    .map(|&(spec, hash)| self.create(spec, hash, &creation_fn))
                    .collect()
            } else {
                ready
                    .iter()
                    .map(|&(spec, hash)| self.create(spec, hash, &creation_fn))
                    .collect()
            };

            for (&(spec, hash), (outcome, elapsed)) in ready.iter().zip(outcomes) {
                ledger.record(self.cache, spec, hash, outcome, elapsed);
            }
        }

        ledger.finish(self.cache)
    }

    /// Plans and executes a run, awaiting the creation function.
    pub async fn execute_async<F, Fut>(
        &self,
        force_rerun: &BTreeSet<String>,
        creation_fn: F,
    ) -> ExecutionResult
    where
        F: Fn(ArtifactSpec) -> Fut,
        Fut: Future<Output = Result<String, CreationError>>,
    {
        let plan = self.plan_execution(force_rerun);
        self.execute_plan_async(&plan, creation_fn).await
    }

    /// Executes a previously computed plan, awaiting the creation function.
    ///
    /// Artifacts of one wave are awaited concurrently. Ordering and blocking
    /// behave as in [`execute_plan`](Self::execute_plan).
    pub async fn execute_plan_async<F, Fut>(
        &self,
        plan: &ExecutionPlan,
        creation_fn: F,
    ) -> ExecutionResult
    where
        F: Fn(ArtifactSpec) -> Fut,
        Fut: Future<Output = Result<String, CreationError>>,
    {
        let mut ledger = RunLedger::begin(self.cache, plan);

        for wave in self.graph.execution_waves() {
            let ready = ledger.admit(self.graph, &wave);
            if ready.is_empty() {
                continue;
            }
            debug!(artifacts = ready.len(), "executing wave");

            let outcomes = futures::future::join_all(
                ready
                    .iter()
                    .map(|&(spec, hash)| self.create_async(spec, hash, &creation_fn)),
            )
            .await;

            for (&(spec, hash), (outcome, elapsed)) in ready.iter().zip(outcomes) {
                ledger.record(self.cache, spec, hash, outcome, elapsed);
            }
        }

        ledger.finish(self.cache)
    }

    fn create<F>(
        &self,
        spec: &ArtifactSpec,
        hash: ContentHash,
        creation_fn: &F,
    ) -> (Result<String, CreationError>, Duration)
    where
        F: Fn(&ArtifactSpec) -> Result<String, CreationError>,
    {
        debug!(artifact = %spec.id, "creating artifact");
        let started = Instant::now();
        let outcome = match self.deduper {
            Some(deduper) => deduper
                .run(dedupe_key(&spec.id, &hash), || creation_fn(spec))
                .map_err(CreationError::from),
            None => creation_fn(spec),
        };
        (outcome, started.elapsed())
    }

    async fn create_async<F, Fut>(
        &self,
        spec: &ArtifactSpec,
        hash: ContentHash,
        creation_fn: &F,
    ) -> (Result<String, CreationError>, Duration)
    where
        F: Fn(ArtifactSpec) -> Fut,
        Fut: Future<Output = Result<String, CreationError>>,
    {
        debug!(artifact = %spec.id, "creating artifact");
        let started = Instant::now();
        let outcome = match self.async_deduper {
            Some(deduper) => deduper
                .run(dedupe_key(&spec.id, &hash), || creation_fn(spec.clone()))
                .await
                .map_err(CreationError::from),
            None => creation_fn(spec.clone()).await,
        };
        (outcome, started.elapsed())
    }
}

/// Key under which identical creation calls are collapsed.
fn dedupe_key(id: &str, hash: &ContentHash) -> String {
    format!("{id}@{hash}")
}

/// Bookkeeping shared by the blocking and async runs.
struct RunLedger<'p> {
    plan: &'p ExecutionPlan,
    result: ExecutionResult,
    run: Option<RunRecord>,
    started: Instant,
}

impl<'p> RunLedger<'p> {
    fn begin(cache: &ExecutionCache, plan: &'p ExecutionPlan) -> Self {
        let mut run_id = Uuid::new_v4().simple().to_string();
        run_id.truncate(8);

        let mut ledger = Self {
            plan,
            result: ExecutionResult {
                run_id: run_id.clone(),
                ..ExecutionResult::default()
            },
            run: None,
            started: Instant::now(),
        };

        match cache.start_run(&run_id, plan.total()) {
            Ok(run) => ledger.run = Some(run),
            Err(e) => ledger.storage_error(&run_id, &e),
        }

        info!(
            run = %run_id,
            cached = plan.to_skip.len(),
            execute = plan.to_execute.len(),
            "starting incremental run"
        );

        for id in &plan.to_skip {
            let cached = plan.decisions.get(id).and_then(|d| d.cached_result.clone());
            ledger.result.skipped.insert(id.clone(), cached);
            if let Err(e) = cache.record_skip(id) {
                ledger.storage_error(id, &e);
            }
        }
        ledger
    }

    /// Filters a wave down to the artifacts that can run now, recording the
    /// rest as blocked.
    fn admit<'g>(
        &mut self,
        graph: &'g ArtifactGraph,
        wave: &[&str],
    ) -> Vec<(&'g ArtifactSpec, ContentHash)> {
        let plan = self.plan;
        let mut ready = Vec::new();
        for &id in wave {
            let Some(decision) = plan.decisions.get(id).filter(|d| !d.can_skip) else {
                continue;
            };
            let Some(spec) = graph.get(id) else {
                continue;
            };

            if let Some(missing) = plan.unsatisfied.get(id) {
                info!(artifact = id, missing = ?missing, "blocked on unknown artifacts");
                self.result.blocked.insert(id.to_string(), missing.clone());
                continue;
            }

            let held: Vec<String> = graph
                .dependencies(id)
                .into_iter()
                .filter(|dep| {
                    self.result.failed.contains_key(*dep) || self.result.blocked.contains_key(*dep)
                })
                .map(str::to_string)
                .collect();
            if !held.is_empty() {
                info!(artifact = id, waiting_on = ?held, "blocked by failed dependencies");
                self.result.blocked.insert(id.to_string(), held);
                continue;
            }

            ready.push((spec, decision.current_hash));
        }
        ready
    }

    fn record(
        &mut self,
        cache: &ExecutionCache,
        spec: &ArtifactSpec,
        hash: ContentHash,
        outcome: Result<String, CreationError>,
        elapsed: Duration,
    ) {
        let duration_ms = elapsed.as_millis() as u64;
        let spec_hash = compute_spec_hash(spec);

        match outcome {
            Ok(content) => {
                debug!(artifact = %spec.id, duration_ms, "artifact completed");
                let output = ArtifactOutput {
                    artifact_id: spec.id.clone(),
                    content,
                    duration_ms,
                };
                let entry = CacheEntry::completed(hash, output.clone()).with_spec_hash(spec_hash);
                if let Err(e) = cache.put(entry) {
                    self.storage_error(&spec.id, &e);
                }
                self.result.completed.insert(spec.id.clone(), output);
            }
            Err(err) => {
                warn!(artifact = %spec.id, error = %err, "artifact failed");
                let message = err.to_string();
                let entry = CacheEntry::failed(&spec.id, hash, &message, duration_ms)
                    .with_spec_hash(spec_hash);
                if let Err(e) = cache.put(entry) {
                    self.storage_error(&spec.id, &e);
                }
                self.result.failed.insert(spec.id.clone(), message);
            }
        }
    }

    fn storage_error(&mut self, subject: &str, err: &dyn std::error::Error) {
        warn!(subject, error = %err, "cache write failed");
        self.result.storage_errors.push(format!("{subject}: {err}"));
    }

    fn finish(mut self, cache: &ExecutionCache) -> ExecutionResult {
        self.result.duration_ms = self.started.elapsed().as_millis() as u64;

        if let Some(mut run) = self.run.take() {
            let status = if self.result.success() {
                RunStatus::Completed
            } else {
                RunStatus::Failed
            };
            if let Err(e) = cache.finish_run(
                &mut run,
                self.result.completed.len(),
                self.result.skipped.len(),
                self.result.failed.len(),
                status,
            ) {
                let run_id = self.result.run_id.clone();
                self.storage_error(&run_id, &e);
            }
        }

        info!("{}", self.result.summary());
        self.result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn diamond() -> ArtifactGraph {
        ArtifactGraph::from_specs([
            ArtifactSpec::new("Base", "d", "c"),
            ArtifactSpec::new("Left", "d", "c").requiring("Base"),
            ArtifactSpec::new("Right", "d", "c").requiring("Base"),
            ArtifactSpec::new("Top", "d", "c").requiring("Left").requiring("Right"),
        ])
        .unwrap()
    }

    fn echo(spec: &ArtifactSpec) -> Result<String, CreationError> {
        Ok(format!("built {}", spec.id))
    }

    #[test]
    fn runs_every_artifact_once_in_order() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();
        let order = std::sync::Mutex::new(Vec::new());

        let result = IncrementalExecutor::new(&graph, &cache).execute(&BTreeSet::new(), |spec| {
            order.lock().unwrap().push(spec.id.clone());
            echo(spec)
        });

        assert!(result.is_complete());
        assert_eq!(result.completed.len(), 4);
        let order = order.into_inner().unwrap();
        assert_eq!(order.first().map(String::as_str), Some("Base"));
        assert_eq!(order.last().map(String::as_str), Some("Top"));
        assert_eq!(result.content("Top"), Some("built Top"));
    }

    #[test]
    fn parallel_waves_respect_dependencies() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();
        let done = std::sync::Mutex::new(BTreeSet::new());

        let result = IncrementalExecutor::new(&graph, &cache)
            .with_options(ExecutorOptions { parallel: true })
            .execute(&BTreeSet::new(), |spec| {
                let finished = done.lock().unwrap().clone();
                for dep in &spec.requires {
                    assert!(finished.contains(dep), "{} ran before {dep}", spec.id);
                }
                done.lock().unwrap().insert(spec.id.clone());
                echo(spec)
            });

        assert!(result.is_complete());
        assert_eq!(done.into_inner().unwrap().len(), 4);
    }

    #[test]
    fn failure_blocks_dependents_only() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();

        let result = IncrementalExecutor::new(&graph, &cache).execute(&BTreeSet::new(), |spec| {
            if spec.id == "Left" {
                Err(CreationError::new("left broke"))
            } else {
                echo(spec)
            }
        });

        assert!(!result.success());
        assert_eq!(result.failed["Left"], "left broke");
        assert!(result.completed.contains_key("Right"));
        assert_eq!(result.blocked["Top"], vec!["Left"]);
        assert!(cache.get("Top").is_none());
        assert_eq!(
            cache.get_status("Left"),
            Some(kiln_cache::ExecutionStatus::Failed)
        );
    }

    #[test]
    fn unsatisfied_requires_block_without_attempt() {
        let graph = ArtifactGraph::from_specs([
            ArtifactSpec::new("A", "d", "c"),
            ArtifactSpec::new("B", "d", "c").requiring("Missing"),
            ArtifactSpec::new("C", "d", "c").requiring("B"),
        ])
        .unwrap();
        let cache = ExecutionCache::temporary().unwrap();
        let calls = AtomicUsize::new(0);

        let result = IncrementalExecutor::new(&graph, &cache).execute(&BTreeSet::new(), |spec| {
            calls.fetch_add(1, Ordering::SeqCst);
            echo(spec)
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.blocked["B"], vec!["Missing"]);
        assert_eq!(result.blocked["C"], vec!["B"]);
        assert!(result.success());
        assert!(!result.is_complete());
    }

    #[test]
    fn skipped_artifacts_count_hits() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();
        let executor = IncrementalExecutor::new(&graph, &cache);
        executor.execute(&BTreeSet::new(), echo);

        let second = executor.execute(&BTreeSet::new(), |_| {
            Err(CreationError::new("should not run"))
        });
        assert_eq!(second.skipped.len(), 4);
        assert!(second.completed.is_empty());
        assert_eq!(second.content("Top"), Some("built Top"));
        assert_eq!(cache.get("Base").unwrap().skip_count, 1);
    }

    #[test]
    fn run_is_recorded() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();
        let result = IncrementalExecutor::new(&graph, &cache).execute(&BTreeSet::new(), echo);

        assert_eq!(result.run_id.len(), 8);
        let run = cache.get_run(&result.run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.executed, 4);
        assert_eq!(run.total_artifacts, 4);
    }

    #[test]
    fn spec_hash_stored_with_entry() {
        let graph = diamond();
        let cache = ExecutionCache::temporary().unwrap();
        IncrementalExecutor::new(&graph, &cache).execute(&BTreeSet::new(), echo);
        let entry = cache.get("Left").unwrap();
        assert_eq!(entry.spec_hash, Some(compute_spec_hash(graph.get("Left").unwrap())));
    }

    #[test]
    fn dedupe_key_embeds_hash() {
        let hash = ContentHash::from_str_content("x");
        let key = dedupe_key("A", &hash);
        assert!(key.starts_with("A@"));
        assert_eq!(key.len(), 2 + 64);
    }
}
