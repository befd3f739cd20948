//! On-disk lifecycle of recovery documents.
//!
//! Layout under the state directory:
//!
//! ```text
//! <state_dir>/<goal_hash>.json           pending
//! <state_dir>/archive/<goal_hash>.json   resolved
//! ```
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the target, so the canonical path only ever holds a complete document.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::RecoveryError;
use crate::state::{FailedRun, RecoveryState};
use crate::summary::{preview, RecoverySummary, SummaryFields};
use crate::artifact::ArtifactStatus;
use crate::timestamp;

const ARCHIVE_DIR: &str = "archive";
const STATE_EXT: &str = "json";
const DEFAULT_PREVIEW_CHARS: usize = 100;

/// Reads and writes recovery documents under one state directory.
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    state_dir: PathBuf,
    preview_chars: usize,
}

impl RecoveryManager {
    /// Creates a manager rooted at `state_dir`. Nothing is created on disk
    /// until the first save.
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    /// Sets how many characters of the goal summaries show.
    pub fn with_preview_chars(mut self, chars: usize) -> Self {
        self.preview_chars = chars;
        self
    }

    /// The state directory.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// The archive directory.
    pub fn archive_dir(&self) -> PathBuf {
        self.state_dir.join(ARCHIVE_DIR)
    }

    /// Path of the pending document for `goal_hash`.
    pub fn state_path(&self, goal_hash: &str) -> Result<PathBuf, RecoveryError> {
        validate_goal_hash(goal_hash)?;
        Ok(self.state_dir.join(format!("{goal_hash}.{STATE_EXT}")))
    }

    /// Path of the archived document for `goal_hash`.
    pub fn archive_path(&self, goal_hash: &str) -> Result<PathBuf, RecoveryError> {
        validate_goal_hash(goal_hash)?;
        Ok(self.archive_dir().join(format!("{goal_hash}.{STATE_EXT}")))
    }

    /// Builds the recovery state for a failed run without writing it.
    pub fn create_from_execution(&self, run: FailedRun) -> RecoveryState {
        RecoveryState::from_execution(run)
    }

    /// Writes `state` to its pending path, replacing any previous document
    /// for the same goal. Returns the path written.
    pub fn save(&self, state: &RecoveryState) -> Result<PathBuf, RecoveryError> {
        let (staged, target) = self.stage(state)?;
        commit(staged, &target)?;
        info!(goal_hash = %state.goal_hash, path = %target.display(), "saved recovery state");
        Ok(target)
    }

    /// Writes the document to a temporary file next to its target.
    fn stage(&self, state: &RecoveryState) -> Result<(NamedTempFile, PathBuf), RecoveryError> {
        let target = self.state_path(&state.goal_hash)?;
        create_dir(&self.state_dir)?;

        let io_err = |source| RecoveryError::Io {
            path: self.state_dir.clone(),
            source,
        };
        let mut staged = tempfile::Builder::new()
            .prefix(&format!(".{}.", state.goal_hash))
            .suffix(".tmp")
            .tempfile_in(&self.state_dir)
            .map_err(io_err)?;
        serde_json::to_writer_pretty(&mut staged, state).map_err(RecoveryError::Serialize)?;
        staged.write_all(b"\n").map_err(io_err)?;
        staged.as_file().sync_all().map_err(io_err)?;
        Ok((staged, target))
    }

    /// Loads the pending document for `goal_hash`; a missing file is `None`.
    pub fn load(&self, goal_hash: &str) -> Result<Option<RecoveryState>, RecoveryError> {
        let path = self.state_path(goal_hash)?;
        read_state(&path)
    }

    /// Loads the archived document for `goal_hash`; a missing file is `None`.
    pub fn load_archived(&self, goal_hash: &str) -> Result<Option<RecoveryState>, RecoveryError> {
        let path = self.archive_path(goal_hash)?;
        read_state(&path)
    }

    /// Summaries of pending documents, newest first. Unreadable files are
    /// skipped.
    pub fn list_pending(&self) -> Vec<RecoverySummary> {
        self.list_dir(&self.state_dir)
    }

    /// Summaries of archived documents, newest first.
    pub fn list_archived(&self) -> Vec<RecoverySummary> {
        self.list_dir(&self.archive_dir())
    }

    /// Resolves an exact goal hash or a unique prefix of one to its pending
    /// document.
    pub fn find(&self, prefix: &str) -> Result<RecoveryState, RecoveryError> {
        if validate_goal_hash(prefix).is_ok() {
            if let Some(state) = self.load(prefix)? {
                return Ok(state);
            }
        }
        let matches: Vec<String> = self
            .list_pending()
            .into_iter()
            .map(|s| s.goal_hash)
            .filter(|h| h.starts_with(prefix))
            .collect();
        match matches.as_slice() {
            [] => Err(RecoveryError::NotFound(prefix.to_string())),
            [only] => self
                .load(only)?
                .ok_or_else(|| RecoveryError::NotFound(prefix.to_string())),
            _ => Err(RecoveryError::Ambiguous {
                prefix: prefix.to_string(),
                matches,
            }),
        }
    }

    /// Moves the pending document into the archive. Returns the new path.
    pub fn mark_resolved(&self, goal_hash: &str) -> Result<PathBuf, RecoveryError> {
        let source = self.state_path(goal_hash)?;
        if !source.exists() {
            return Err(RecoveryError::NotFound(goal_hash.to_string()));
        }
        let archive = self.archive_dir();
        create_dir(&archive)?;
        let target = self.archive_path(goal_hash)?;
        std::fs::rename(&source, &target).map_err(|e| RecoveryError::Io {
            path: source.clone(),
            source: e,
        })?;
        info!(goal_hash, path = %target.display(), "archived recovery state");
        Ok(target)
    }

    /// Deletes the pending document. Returns `false` if there was none.
    pub fn delete(&self, goal_hash: &str) -> Result<bool, RecoveryError> {
        let path = self.state_path(goal_hash)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(goal_hash, "deleted recovery state");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RecoveryError::Io { path, source: e }),
        }
    }

    fn list_dir(&self, dir: &Path) -> Vec<RecoverySummary> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(dir = %dir.display(), error = %e, "cannot list recovery states");
                }
                return Vec::new();
            }
        };

        let mut summaries: Vec<RecoverySummary> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| is_state_file(path))
            .filter_map(|path| match self.summarize(&path) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed recovery file");
                    None
                }
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.goal_hash.cmp(&b.goal_hash))
        });
        summaries
    }

    fn summarize(&self, path: &Path) -> Result<RecoverySummary, RecoveryError> {
        let raw = std::fs::read_to_string(path).map_err(|e| RecoveryError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let fields: SummaryFields = serde_json::from_str(&raw).map_err(|e| RecoveryError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let created_at = fields
            .created_at
            .as_deref()
            .and_then(timestamp::parse)
            .or_else(|| modified_at(path))
            .unwrap_or_else(Utc::now);

        let mut summary = RecoverySummary {
            goal_hash: fields.goal_hash.unwrap_or(stem),
            goal_preview: preview(&fields.goal, self.preview_chars),
            run_id: fields.run_id,
            passed: 0,
            failed: 0,
            waiting: 0,
            fixed: 0,
            skipped: 0,
            created_at,
        };
        for artifact in fields.artifacts.values() {
            match ArtifactStatus::from_label(&artifact.status) {
                Some(status) => summary.count(status),
                None => debug!(status = %artifact.status, "ignoring unknown artifact status"),
            }
        }
        Ok(summary)
    }
}

fn read_state(path: &Path) -> Result<Option<RecoveryState>, RecoveryError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RecoveryError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| RecoveryError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Renames a staged file over its target.
fn commit(staged: NamedTempFile, target: &Path) -> Result<(), RecoveryError> {
    staged.persist(target).map_err(|e| RecoveryError::Io {
        path: target.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

fn create_dir(dir: &Path) -> Result<(), RecoveryError> {
    std::fs::create_dir_all(dir).map_err(|e| RecoveryError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

fn is_state_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(STATE_EXT)
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Utc>::from(modified))
}

/// Accepts non-empty ASCII letters, digits, `-` and `_`, up to 128 chars.
fn validate_goal_hash(goal_hash: &str) -> Result<(), RecoveryError> {
    let valid = !goal_hash.is_empty()
        && goal_hash.len() <= 128
        && goal_hash
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(RecoveryError::InvalidGoalHash(goal_hash.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::state::{ExecutedArtifact, GateResult};

    fn state(goal: &str) -> RecoveryState {
        let mut run = FailedRun::new(goal, "run-1");
        run.artifacts = vec![
            ExecutedArtifact::new("a.py", "print('a')"),
            ExecutedArtifact::new("b.py", "").depending_on("a.py"),
        ];
        run.gate_results = HashMap::from([
            ("a.py".to_string(), GateResult::fail(["error1", "error2"])),
        ]);
        run.failure_reason = "tests failed".to_string();
        RecoveryState::from_execution(run)
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let original = state("Build a CLI");

        let path = manager.save(&original).unwrap();
        assert_eq!(path, manager.state_path(&original.goal_hash).unwrap());

        let loaded = manager.load(&original.goal_hash).unwrap().unwrap();
        assert_eq!(loaded.goal, original.goal);
        assert_eq!(loaded.goal_hash, original.goal_hash);
        assert_eq!(loaded.run_id, original.run_id);
        assert_eq!(loaded.artifacts, original.artifacts);
        assert_eq!(loaded.failure_reason, original.failure_reason);
        assert_eq!(loaded.error_details, original.error_details);
        assert_eq!(loaded.artifacts["a.py"].errors, vec!["error1", "error2"]);
    }

    #[test]
    fn load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        assert!(manager.load("nonexistent").unwrap().is_none());
    }

    #[test]
    fn load_malformed_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let err = RecoveryManager::new(dir.path()).load("bad").unwrap_err();
        assert!(matches!(err, RecoveryError::Parse { .. }));
    }

    #[test]
    fn save_overwrites_same_goal() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let mut s = state("Same goal");
        manager.save(&s).unwrap();
        s.failure_reason = "second failure".to_string();
        manager.save(&s).unwrap();

        assert_eq!(manager.list_pending().len(), 1);
        let loaded = manager.load(&s.goal_hash).unwrap().unwrap();
        assert_eq!(loaded.failure_reason, "second failure");
    }

    #[test]
    fn crash_before_rename_keeps_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let mut s = state("Crash test");
        manager.save(&s).unwrap();

        s.failure_reason = "never committed".to_string();
        let (staged, target) = manager.stage(&s).unwrap();
        // Leave the temp file behind as a crash would.
        let leftover = staged.into_temp_path().keep().unwrap();
        assert!(leftover.exists());

        let raw = std::fs::read_to_string(&target).unwrap();
        let on_disk: RecoveryState = serde_json::from_str(&raw).unwrap();
        assert_eq!(on_disk.failure_reason, "tests failed");
        assert_eq!(manager.list_pending().len(), 1);
    }

    #[test]
    fn dropped_stage_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let s = state("Drop test");
        let (staged, target) = manager.stage(&s).unwrap();
        drop(staged);
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn mark_resolved_moves_to_archive() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let s = state("Archive me");
        let pending = manager.save(&s).unwrap();

        let archived = manager.mark_resolved(&s.goal_hash).unwrap();
        assert!(!pending.exists());
        assert!(archived.exists());
        assert!(archived.starts_with(dir.path().join("archive")));
        assert!(manager.list_pending().is_empty());
        assert_eq!(manager.list_archived().len(), 1);
        assert!(manager.load_archived(&s.goal_hash).unwrap().is_some());
    }

    #[test]
    fn mark_resolved_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecoveryManager::new(dir.path())
            .mark_resolved("absent")
            .unwrap_err();
        assert!(matches!(err, RecoveryError::NotFound(_)));
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let s = state("Delete me");
        let path = manager.save(&s).unwrap();

        assert!(manager.delete(&s.goal_hash).unwrap());
        assert!(!path.exists());
        assert!(!manager.delete(&s.goal_hash).unwrap());
    }

    #[test]
    fn rejects_unsafe_goal_hashes() {
        let manager = RecoveryManager::new("/tmp/unused");
        for bad in ["", "../escape", "a/b", ".hidden", "with space"] {
            assert!(
                matches!(manager.state_path(bad), Err(RecoveryError::InvalidGoalHash(_))),
                "{bad:?}"
            );
        }
        assert!(manager.state_path("abc-123_DEF").is_ok());
    }

    #[test]
    fn find_by_unique_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path());
        let mut first = RecoveryState::new("first", "aaa111", "r1");
        first.failure_reason = "x".to_string();
        let second = RecoveryState::new("second", "aab222", "r2");
        manager.save(&first).unwrap();
        manager.save(&second).unwrap();

        assert_eq!(manager.find("aaa111").unwrap().goal, "first");
        assert_eq!(manager.find("aab").unwrap().goal, "second");
        assert!(matches!(
            manager.find("aa"),
            Err(RecoveryError::Ambiguous { matches: ref found, .. }) if found.len() == 2
        ));
        assert!(matches!(manager.find("zzz"), Err(RecoveryError::NotFound(_))));
    }

    #[test]
    fn list_on_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path().join("never-created"));
        assert!(manager.list_pending().is_empty());
        assert!(manager.list_archived().is_empty());
    }

    #[test]
    fn preview_length_is_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RecoveryManager::new(dir.path()).with_preview_chars(10);
        manager
            .save(&RecoveryState::new("a rather long goal description", "g1", "r"))
            .unwrap();
        assert_eq!(manager.list_pending()[0].goal_preview, "a rathe...");
    }
}
