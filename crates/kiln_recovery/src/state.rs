//! The recovery document for one failed goal.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactStatus, RecoveryArtifact};

/// Verdict of the external gate for one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    /// Whether the artifact was accepted.
    pub passed: bool,
    /// Problems the gate reported.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl GateResult {
    /// An accepting verdict.
    pub fn pass() -> Self {
        Self {
            passed: true,
            errors: Vec::new(),
        }
    }

    /// A rejecting verdict with the given errors.
    pub fn fail<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passed: false,
            errors: errors.into_iter().map(Into::into).collect(),
        }
    }
}

/// An artifact as it stood in memory when the run failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedArtifact {
    /// Path of the produced file.
    pub path: String,
    /// Produced content; empty if never produced.
    pub content: String,
    /// Paths of the artifacts it depends on.
    pub depends_on: Vec<String>,
}

impl ExecutedArtifact {
    /// Creates an artifact with no dependencies.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            depends_on: Vec::new(),
        }
    }

    /// Adds a dependency.
    pub fn depending_on(mut self, path: impl Into<String>) -> Self {
        self.depends_on.push(path.into());
        self
    }
}

/// Everything known about a failed run, as handed over by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct FailedRun {
    /// The goal text.
    pub goal: String,
    /// Key of the recovery document; see [`kiln_common::goal_hash`].
    pub goal_hash: String,
    /// Identifier of the failed run.
    pub run_id: String,
    /// Artifacts of the run.
    pub artifacts: Vec<ExecutedArtifact>,
    /// Gate verdicts keyed by artifact path. A missing verdict counts as a
    /// rejection.
    pub gate_results: HashMap<String, GateResult>,
    /// Name of the gate that stopped the run.
    pub failed_gate: Option<String>,
    /// Human-readable failure reason.
    pub failure_reason: String,
    /// Iteration records carried along verbatim.
    pub iterations: Vec<serde_json::Value>,
}

impl FailedRun {
    /// Starts a report for `goal`, deriving its goal hash.
    pub fn new(goal: impl Into<String>, run_id: impl Into<String>) -> Self {
        let goal = goal.into();
        Self {
            goal_hash: kiln_common::goal_hash(&goal),
            goal,
            run_id: run_id.into(),
            ..Self::default()
        }
    }
}

/// Durable snapshot of a failed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryState {
    /// The goal text.
    pub goal: String,
    /// Key and file name of the document.
    pub goal_hash: String,
    /// Identifier of the failed run.
    #[serde(default)]
    pub run_id: String,
    /// Artifacts keyed by path.
    #[serde(default)]
    pub artifacts: BTreeMap<String, RecoveryArtifact>,
    /// Name of the gate that stopped the run.
    #[serde(default)]
    pub failed_gate: Option<String>,
    /// Human-readable failure reason.
    #[serde(default)]
    pub failure_reason: String,
    /// Every gate error as `"path: error"`.
    #[serde(default)]
    pub error_details: Vec<String>,
    /// Iteration records from the failed run.
    #[serde(default)]
    pub iteration_history: Vec<serde_json::Value>,
    /// Repairs attempted since the failure.
    #[serde(default)]
    pub fix_attempts: Vec<serde_json::Value>,
    /// When the document was created.
    #[serde(default = "Utc::now", with = "crate::timestamp")]
    pub created_at: DateTime<Utc>,
    /// When the document last changed.
    #[serde(default = "Utc::now", with = "crate::timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl RecoveryState {
    /// Creates an empty state.
    pub fn new(goal: impl Into<String>, goal_hash: impl Into<String>, run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            goal: goal.into(),
            goal_hash: goal_hash.into(),
            run_id: run_id.into(),
            artifacts: BTreeMap::new(),
            failed_gate: None,
            failure_reason: String::new(),
            error_details: Vec::new(),
            iteration_history: Vec::new(),
            fix_attempts: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Classifies the artifacts of a failed run.
    ///
    /// An artifact is `Waiting` if anything it depends on, directly or
    /// transitively, did not pass its gate; otherwise `Passed` if its gate
    /// passed, else `Failed`.
    pub fn from_execution(run: FailedRun) -> Self {
        let rejected: BTreeSet<String> = run
            .artifacts
            .iter()
            .filter(|a| !run.gate_results.get(&a.path).is_some_and(|g| g.passed))
            .map(|a| a.path.clone())
            .collect();
        let waiting = held_back(&run.artifacts, &rejected);

        let mut state = Self::new(run.goal, run.goal_hash, run.run_id);
        state.failed_gate = run.failed_gate;
        state.failure_reason = run.failure_reason;
        state.iteration_history = run.iterations;

        for artifact in run.artifacts {
            let errors = run
                .gate_results
                .get(&artifact.path)
                .map(|g| g.errors.clone())
                .unwrap_or_default();
            let status = if waiting.contains(&artifact.path) {
                ArtifactStatus::Waiting
            } else if rejected.contains(&artifact.path) {
                ArtifactStatus::Failed
            } else {
                ArtifactStatus::Passed
            };
            state.artifacts.insert(
                artifact.path.clone(),
                RecoveryArtifact {
                    path: artifact.path,
                    content: artifact.content,
                    status,
                    errors,
                    depends_on: artifact.depends_on,
                },
            );
        }

        state.error_details = state
            .artifacts
            .values()
            .flat_map(|a| a.errors.iter().map(move |e| format!("{}: {e}", a.path)))
            .collect();
        state
    }

    fn with_status(&self, status: ArtifactStatus) -> Vec<&RecoveryArtifact> {
        self.artifacts.values().filter(|a| a.status == status).collect()
    }

    /// Artifacts that passed their gate.
    pub fn passed_artifacts(&self) -> Vec<&RecoveryArtifact> {
        self.with_status(ArtifactStatus::Passed)
    }

    /// Artifacts that failed their gate.
    pub fn failed_artifacts(&self) -> Vec<&RecoveryArtifact> {
        self.with_status(ArtifactStatus::Failed)
    }

    /// Artifacts held back by failed dependencies.
    pub fn waiting_artifacts(&self) -> Vec<&RecoveryArtifact> {
        self.with_status(ArtifactStatus::Waiting)
    }

    /// Artifacts repaired since the failure.
    pub fn fixed_artifacts(&self) -> Vec<&RecoveryArtifact> {
        self.with_status(ArtifactStatus::Fixed)
    }

    /// Returns `true` if some work survived and can seed a retry.
    pub fn recovery_possible(&self) -> bool {
        self.artifacts.values().any(|a| a.status == ArtifactStatus::Passed)
    }

    /// Returns `true` if no artifact needs further work.
    pub fn is_resolved(&self) -> bool {
        self.artifacts.values().all(RecoveryArtifact::is_resolved)
    }

    /// One-line status counts, e.g. `2 passed, 1 failed, 1 waiting`.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = ArtifactStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let count = self.artifacts.values().filter(|a| a.status == status).count();
                (count > 0).then(|| format!("{count} {status}"))
            })
            .collect();
        if parts.is_empty() {
            "no artifacts".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Replaces an artifact's content and marks it fixed. Unknown paths are
    /// ignored.
    pub fn mark_fixed(&mut self, path: &str, content: impl Into<String>) {
        if let Some(artifact) = self.artifacts.get_mut(path) {
            *artifact = artifact.with_content(content);
            self.touch();
        }
    }

    /// Marks an artifact skipped. Unknown paths are ignored.
    pub fn mark_skipped(&mut self, path: &str) {
        if let Some(artifact) = self.artifacts.get_mut(path) {
            artifact.status = ArtifactStatus::Skipped;
            self.touch();
        }
    }

    /// Appends a repair attempt record.
    pub fn record_fix_attempt(&mut self, attempt: serde_json::Value) {
        self.fix_attempts.push(attempt);
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Builds the briefing handed to a repair agent: the goal, why the run
    /// failed, every failing artifact with its errors and content, and the
    /// passed artifacts for context.
    pub fn healing_context(&self) -> String {
        let mut out = format!("Goal: {}\nFailure: {}\n", self.goal, self.failure_reason);
        if let Some(gate) = &self.failed_gate {
            out.push_str(&format!("Failed gate: {gate}\n"));
        }

        let failed = self.failed_artifacts();
        if !failed.is_empty() {
            out.push_str("\nArtifacts to fix:\n");
            for artifact in failed {
                out.push_str(&format!("\n## {}\n", artifact.path));
                for error in &artifact.errors {
                    out.push_str(&format!("- {error}\n"));
                }
                if !artifact.content.is_empty() {
                    out.push_str(&format!("```\n{}\n```\n", artifact.content.trim_end()));
                }
            }
        }

        let sections = [
            ("Waiting on the fixes above:", self.waiting_artifacts()),
            ("Already passing (context):", self.passed_artifacts()),
        ];
        for (heading, artifacts) in sections {
            if artifacts.is_empty() {
                continue;
            }
            out.push_str(&format!("\n{heading}\n"));
            for artifact in artifacts {
                out.push_str(&format!("- {}\n", artifact.path));
            }
        }
        out
    }
}

/// Paths that transitively depend on a rejected artifact.
fn held_back(artifacts: &[ExecutedArtifact], rejected: &BTreeSet<String>) -> BTreeSet<String> {
    let mut waiting: BTreeSet<String> = BTreeSet::new();
    loop {
        let before = waiting.len();
        for artifact in artifacts {
            if waiting.contains(&artifact.path) {
                continue;
            }
            let blocked = artifact
                .depends_on
                .iter()
                .any(|dep| rejected.contains(dep) || waiting.contains(dep));
            if blocked {
                waiting.insert(artifact.path.clone());
            }
        }
        if waiting.len() == before {
            return waiting;
        }
    }
}
