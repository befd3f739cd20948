//! Lightweight listing view of recovery documents.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactStatus;

/// Listing entry for one recovery document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySummary {
    /// Key of the document.
    pub goal_hash: String,
    /// Start of the goal text.
    pub goal_preview: String,
    /// Identifier of the failed run.
    pub run_id: String,
    /// Artifacts that passed.
    pub passed: usize,
    /// Artifacts that failed.
    pub failed: usize,
    /// Artifacts held back by failures.
    pub waiting: usize,
    /// Artifacts repaired since.
    pub fixed: usize,
    /// Artifacts skipped during review.
    pub skipped: usize,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
}

impl RecoverySummary {
    /// Number of artifacts with a known status.
    pub fn total(&self) -> usize {
        self.passed + self.failed + self.waiting + self.fixed + self.skipped
    }

    /// Age of the document relative to now, e.g. `3h ago`.
    pub fn age_str(&self) -> String {
        self.age_at(Utc::now())
    }

    /// Age of the document relative to `now`.
    pub fn age_at(&self, now: DateTime<Utc>) -> String {
        let seconds = (now - self.created_at).num_seconds().max(0);
        match seconds {
            0..=59 => "just now".to_string(),
            60..=3_599 => format!("{}m ago", seconds / 60),
            3_600..=86_399 => format!("{}h ago", seconds / 3_600),
            _ => format!("{}d ago", seconds / 86_400),
        }
    }

    pub(crate) fn count(&mut self, status: ArtifactStatus) {
        let slot = match status {
            ArtifactStatus::Passed => &mut self.passed,
            ArtifactStatus::Failed => &mut self.failed,
            ArtifactStatus::Waiting => &mut self.waiting,
            ArtifactStatus::Fixed => &mut self.fixed,
            ArtifactStatus::Skipped => &mut self.skipped,
        };
        *slot += 1;
    }
}

/// The fields a listing needs, parsed without validating the rest.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct SummaryFields {
    pub goal_hash: Option<String>,
    pub goal: String,
    pub run_id: String,
    pub artifacts: BTreeMap<String, StatusField>,
    pub created_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct StatusField {
    pub status: String,
}

/// Truncates `goal` to at most `max_chars` characters, marking the cut.
pub(crate) fn preview(goal: &str, max_chars: usize) -> String {
    let goal = goal.trim();
    if goal.chars().count() <= max_chars {
        return goal.to_string();
    }
    let mut out: String = goal.chars().take(max_chars.saturating_sub(3)).collect();
    out.push_str("...");
    out
}
