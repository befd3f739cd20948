//! Error types for cache operations.

use std::path::PathBuf;

/// Errors that can occur during cache operations.
///
/// Reads are fail-safe: a read error becomes a cache miss and is only logged.
/// Writes surface these errors to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// An I/O error occurred while preparing the cache directory.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// Directory being prepared.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },

    /// The embedded database reported an error.
    #[error("cache store error: {0}")]
    Store(#[from] sled::Error),

    /// A stored record has an invalid or missing header.
    #[error("invalid record header for '{key}': {reason}")]
    InvalidHeader {
        /// The record key.
        key: String,
        /// Description of the header problem.
        reason: String,
    },

    /// The payload does not hash to the checksum in its header.
    #[error("checksum mismatch for '{key}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The record key.
        key: String,
        /// Checksum recorded in the header.
        expected: String,
        /// Checksum of the payload as read.
        actual: String,
    },

    /// The record was written by a different format version.
    #[error("version mismatch for '{key}': expected {expected}, got {actual}")]
    VersionMismatch {
        /// The record key.
        key: String,
        /// Version this build reads.
        expected: u32,
        /// Version found in the header.
        actual: u32,
    },

    /// bincode could not encode or decode a record.
    #[error("serialization error: {reason}")]
    Serialization {
        /// What went wrong.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_display() {
        let err = CacheError::Io {
            path: PathBuf::from("/tmp/.kiln/cache"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("cache I/O error"));
        assert!(msg.contains(".kiln/cache"));
    }

    #[test]
    fn invalid_header_display() {
        let err = CacheError::InvalidHeader {
            key: "UserModel".to_string(),
            reason: "missing magic bytes".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid record header"));
        assert!(msg.contains("UserModel"));
    }

    #[test]
    fn checksum_mismatch_display() {
        let err = CacheError::ChecksumMismatch {
            key: "A".to_string(),
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = CacheError::VersionMismatch {
            key: "A".to_string(),
            expected: 2,
            actual: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("got 1"));
    }

    #[test]
    fn serialization_error_display() {
        let err = CacheError::Serialization {
            reason: "unexpected end".to_string(),
        };
        assert!(err.to_string().contains("unexpected end"));
    }
}
