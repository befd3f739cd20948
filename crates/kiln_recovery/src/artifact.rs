//! Per-artifact recovery records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an artifact stands in a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    /// Produced and accepted by its gate.
    Passed,
    /// Produced and rejected by its gate, or never produced.
    Failed,
    /// Held back because something it depends on did not pass.
    Waiting,
    /// Repaired after the failure.
    Fixed,
    /// Deliberately left as is during review.
    Skipped,
}

impl ArtifactStatus {
    /// All statuses, in display order.
    pub const ALL: [ArtifactStatus; 5] = [
        Self::Passed,
        Self::Failed,
        Self::Waiting,
        Self::Fixed,
        Self::Skipped,
    ];

    /// Lowercase label as stored on disk.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Waiting => "waiting",
            Self::Fixed => "fixed",
            Self::Skipped => "skipped",
        }
    }

    /// Parses a stored label; unknown labels yield `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == label)
    }

    /// Returns `true` for statuses that need no further work.
    pub fn is_resolved(self) -> bool {
        matches!(self, Self::Passed | Self::Fixed | Self::Skipped)
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one artifact at failure time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryArtifact {
    /// Path of the produced file, also its key in the recovery state.
    pub path: String,
    /// Content produced before the failure.
    #[serde(default)]
    pub content: String,
    /// Current status.
    pub status: ArtifactStatus,
    /// Gate errors for this artifact.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Paths of the artifacts this one depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl RecoveryArtifact {
    /// Creates a record with no errors or dependencies.
    pub fn new(path: impl Into<String>, content: impl Into<String>, status: ArtifactStatus) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            status,
            errors: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    /// Returns `true` if a reviewer should look at this artifact.
    pub fn needs_review(&self) -> bool {
        self.status == ArtifactStatus::Failed
    }

    /// Returns `true` if the artifact needs no further work.
    pub fn is_resolved(&self) -> bool {
        self.status.is_resolved()
    }

    /// Returns a copy with a different status.
    pub fn with_status(&self, status: ArtifactStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    /// Returns a repaired copy: new content, status `Fixed`, errors cleared.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: ArtifactStatus::Fixed,
            errors: Vec::new(),
            ..self.clone()
        }
    }
}
