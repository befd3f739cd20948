//! Errors raised while reading `kiln.toml`.

use std::path::PathBuf;

/// Why a configuration could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Cause.
        source: std::io::Error,
    },

    /// Not TOML, or a key kiln does not know.
    #[error("invalid kiln.toml: {0}")]
    Parse(String),

    /// A value parsed but cannot be used.
    #[error("{field} {reason}")]
    Invalid {
        /// Dotted key of the offending value.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}
