//! Persistent execution cache.
//!
//! `ExecutionCache` keeps the latest execution record for every artifact in an
//! embedded sled database, alongside run bookkeeping and goal-to-artifact
//! associations. Reads are fail-safe: a storage or decoding error is logged
//! and reported as a miss. Writes return their errors to the caller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use kiln_common::ContentHash;
use tracing::{debug, warn};

use crate::entry::{
    ArtifactOutput, CacheEntry, CacheStats, ExecutionStatus, GoalRecord, RunRecord, RunStatus,
};
use crate::error::CacheError;
use crate::record;

const ARTIFACTS_TREE: &str = "artifacts";
const RUNS_TREE: &str = "runs";
const GOALS_TREE: &str = "goals";

/// Durable map from artifact id to its most recent execution.
///
/// Cloning is cheap and clones share the same underlying database, so one
/// cache can be handed to several worker threads.
#[derive(Clone, Debug)]
pub struct ExecutionCache {
    db: sled::Db,
    artifacts: sled::Tree,
    runs: sled::Tree,
    goals: sled::Tree,
    path: Option<PathBuf>,
}

impl ExecutionCache {
    /// Opens (or creates) the cache stored at `path`.
    pub fn open(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        let db = sled::open(path)?;
        let cache = Self::from_db(db, Some(path.to_path_buf()))?;
        debug!(path = %path.display(), entries = cache.len(), "opened execution cache");
        Ok(cache)
    }

    /// Opens a cache that lives only as long as this handle and its clones.
    pub fn temporary() -> Result<Self, CacheError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db, None)
    }

    fn from_db(db: sled::Db, path: Option<PathBuf>) -> Result<Self, CacheError> {
        Ok(Self {
            artifacts: db.open_tree(ARTIFACTS_TREE)?,
            runs: db.open_tree(RUNS_TREE)?,
            goals: db.open_tree(GOALS_TREE)?,
            db,
            path,
        })
    }

    /// Location on disk, or `None` for a temporary cache.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the full record for an artifact.
    pub fn get(&self, artifact_id: &str) -> Option<CacheEntry> {
        match self.artifacts.get(artifact_id.as_bytes()) {
            Ok(Some(raw)) => match record::decode(artifact_id, &raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(artifact = artifact_id, error = %e, "discarding unreadable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(artifact = artifact_id, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Returns the input hash of the artifact's last execution.
    pub fn get_hash(&self, artifact_id: &str) -> Option<ContentHash> {
        self.get(artifact_id).map(|e| e.input_hash)
    }

    /// Returns the status of the artifact's last execution.
    pub fn get_status(&self, artifact_id: &str) -> Option<ExecutionStatus> {
        self.get(artifact_id).map(|e| e.status)
    }

    /// Returns the output of the artifact's last execution, if it completed.
    pub fn get_result(&self, artifact_id: &str) -> Option<ArtifactOutput> {
        self.get(artifact_id).and_then(|e| e.result)
    }

    /// Records an execution outcome, replacing any previous record for the id.
    pub fn set(
        &self,
        artifact_id: &str,
        input_hash: ContentHash,
        status: ExecutionStatus,
        result: Option<ArtifactOutput>,
    ) -> Result<(), CacheError> {
        let execution_time_ms = result.as_ref().map_or(0, |r| r.duration_ms);
        self.put(CacheEntry {
            artifact_id: artifact_id.to_string(),
            input_hash,
            spec_hash: None,
            status,
            result,
            error: None,
            executed_at: Utc::now(),
            execution_time_ms,
            skip_count: 0,
        })
    }

    /// Stores a complete entry, replacing any previous record for its id.
    ///
    /// The skip counter carries over from the replaced record.
    pub fn put(&self, mut entry: CacheEntry) -> Result<(), CacheError> {
        if let Some(previous) = self.get(&entry.artifact_id) {
            entry.skip_count = previous.skip_count;
        }
        let raw = record::encode(&entry)?;
        self.artifacts.insert(entry.artifact_id.as_bytes(), raw)?;
        debug!(
            artifact = %entry.artifact_id,
            status = entry.status.as_str(),
            hash = %entry.input_hash.short(),
            "cached execution"
        );
        Ok(())
    }

    /// Increments the skip counter of an artifact.
    ///
    /// Returns `false` if there is no readable entry to update.
    pub fn record_skip(&self, artifact_id: &str) -> Result<bool, CacheError> {
        let mut bumped = false;
        self.artifacts
            .fetch_and_update(artifact_id.as_bytes(), |old| {
                bumped = false;
                let old = old?;
                let updated = record::decode::<CacheEntry>(artifact_id, old).and_then(|mut e| {
                    e.skip_count += 1;
                    record::encode(&e)
                });
                match updated {
                    Ok(raw) => {
                        bumped = true;
                        Some(raw)
                    }
                    Err(_) => Some(old.to_vec()),
                }
            })?;
        Ok(bumped)
    }

    /// Removes the record for an artifact. Returns `true` if one existed.
    pub fn delete(&self, artifact_id: &str) -> Result<bool, CacheError> {
        Ok(self.artifacts.remove(artifact_id.as_bytes())?.is_some())
    }

    /// Removes every artifact, run, and goal record.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.artifacts.clear()?;
        self.runs.clear()?;
        self.goals.clear()?;
        Ok(())
    }

    /// Number of artifact records.
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns `true` if no artifact records are stored.
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// All readable artifact records, most recently executed first.
    pub fn list(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self
            .artifacts
            .iter()
            .filter_map(|item| match item {
                Ok((key, raw)) => {
                    let key = String::from_utf8_lossy(&key);
                    record::decode(&key, &raw)
                        .map_err(|e| warn!(artifact = %key, error = %e, "skipping unreadable cache entry"))
                        .ok()
                }
                Err(e) => {
                    warn!(error = %e, "cache scan failed");
                    None
                }
            })
            .collect();
        entries.sort_by(|a, b| {
            b.executed_at
                .cmp(&a.executed_at)
                .then_with(|| a.artifact_id.cmp(&b.artifact_id))
        });
        entries
    }

    /// Aggregates statistics over all readable entries.
    pub fn stats(&self) -> CacheStats {
        let entries = self.list();
        let mut stats = CacheStats {
            total_artifacts: entries.len(),
            ..CacheStats::default()
        };

        let mut completed_time = 0u64;
        let mut completed = 0usize;
        for entry in &entries {
            *stats.by_status.entry(entry.status).or_insert(0) += 1;
            stats.total_skips += entry.skip_count;
            if entry.is_completed() {
                completed_time += entry.execution_time_ms;
                completed += 1;
            }
        }

        if completed > 0 {
            stats.avg_execution_time_ms = completed_time as f64 / completed as f64;
        }
        stats.estimated_time_saved_ms = stats.total_skips as f64 * stats.avg_execution_time_ms;
        let resolutions = stats.total_skips + stats.total_artifacts as u64;
        if resolutions > 0 {
            stats.cache_hit_rate = stats.total_skips as f64 / resolutions as f64 * 100.0;
        }
        stats
    }

    /// Creates and stores the record for a run that is starting now.
    pub fn start_run(&self, run_id: &str, total_artifacts: usize) -> Result<RunRecord, CacheError> {
        let run = RunRecord {
            run_id: run_id.to_string(),
            started_at: Utc::now(),
            finished_at: None,
            total_artifacts,
            executed: 0,
            skipped: 0,
            failed: 0,
            status: RunStatus::Running,
        };
        self.runs.insert(run_id.as_bytes(), record::encode(&run)?)?;
        Ok(run)
    }

    /// Marks a run finished with its final counts.
    pub fn finish_run(
        &self,
        run: &mut RunRecord,
        executed: usize,
        skipped: usize,
        failed: usize,
        status: RunStatus,
    ) -> Result<(), CacheError> {
        run.finished_at = Some(Utc::now());
        run.executed = executed;
        run.skipped = skipped;
        run.failed = failed;
        run.status = status;
        self.runs
            .insert(run.run_id.as_bytes(), record::encode(&*run)?)?;
        Ok(())
    }

    /// Looks up a run by id.
    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        let raw = self.runs.get(run_id.as_bytes()).ok().flatten()?;
        record::decode(run_id, &raw).ok()
    }

    /// All readable run records, newest first.
    pub fn list_runs(&self) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter_map(Result::ok)
            .filter_map(|(key, raw)| record::decode(&String::from_utf8_lossy(&key), &raw).ok())
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs
    }

    /// Associates the artifacts produced for a goal with its hash.
    pub fn record_goal(
        &self,
        goal_hash: &str,
        artifact_ids: impl IntoIterator<Item = String>,
        execution_time_ms: Option<u64>,
    ) -> Result<(), CacheError> {
        let mut artifact_ids: Vec<String> = artifact_ids.into_iter().collect();
        artifact_ids.sort();
        artifact_ids.dedup();
        let goal = GoalRecord {
            goal_hash: goal_hash.to_string(),
            artifact_ids,
            executed_at: Utc::now(),
            execution_time_ms,
        };
        self.goals
            .insert(goal_hash.as_bytes(), record::encode(&goal)?)?;
        Ok(())
    }

    /// Looks up the artifacts recorded for a goal.
    pub fn get_goal(&self, goal_hash: &str) -> Option<GoalRecord> {
        let raw = self.goals.get(goal_hash.as_bytes()).ok().flatten()?;
        record::decode(goal_hash, &raw).ok()
    }

    /// Artifact ids recorded for a goal; empty if the goal is unknown.
    pub fn artifacts_for_goal(&self, goal_hash: &str) -> Vec<String> {
        self.get_goal(goal_hash)
            .map(|g| g.artifact_ids)
            .unwrap_or_default()
    }

    /// Most recent execution time across all artifact records.
    pub fn last_executed(&self) -> Option<DateTime<Utc>> {
        self.list().first().map(|e| e.executed_at)
    }

    /// Flushes pending writes to disk.
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db.flush()?;
        Ok(())
    }
}
