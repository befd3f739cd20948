//! Error types for recovery persistence.

use std::path::PathBuf;

/// Errors that can occur while reading or writing recovery state.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// An I/O error occurred.
    #[error("recovery I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A recovery document could not be parsed.
    #[error("malformed recovery file {path}: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The underlying JSON error.
        source: serde_json::Error,
    },

    /// A recovery document could not be serialized.
    #[error("failed to serialize recovery state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// No pending recovery exists for the goal hash.
    #[error("no pending recovery for '{0}'")]
    NotFound(String),

    /// A prefix matched more than one pending recovery.
    #[error("'{prefix}' matches several recoveries: {}", matches.join(", "))]
    Ambiguous {
        /// The prefix that was looked up.
        prefix: String,
        /// Goal hashes that start with the prefix.
        matches: Vec<String>,
    },

    /// The goal hash is not usable as a file name.
    #[error("invalid goal hash '{0}': expected letters, digits, '-' or '_'")]
    InvalidGoalHash(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = RecoveryError::Io {
            path: PathBuf::from(".kiln/recovery/abc.json"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc.json"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn parse_error_display() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = RecoveryError::Parse {
            path: PathBuf::from("bad.json"),
            source,
        };
        assert!(err.to_string().contains("malformed recovery file bad.json"));
    }

    #[test]
    fn not_found_display() {
        let err = RecoveryError::NotFound("abc123".to_string());
        assert_eq!(err.to_string(), "no pending recovery for 'abc123'");
    }

    #[test]
    fn ambiguous_lists_matches() {
        let err = RecoveryError::Ambiguous {
            prefix: "ab".to_string(),
            matches: vec!["ab12".to_string(), "ab34".to_string()],
        };
        assert_eq!(err.to_string(), "'ab' matches several recoveries: ab12, ab34");
    }

    #[test]
    fn invalid_goal_hash_display() {
        let err = RecoveryError::InvalidGoalHash("../etc".to_string());
        assert!(err.to_string().contains("../etc"));
    }
}
