//! Resolution of configured paths against a project root.

use crate::types::KilnConfig;
use std::path::{Path, PathBuf};

/// Absolute locations derived from a configuration and its project root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPaths {
    /// The project root the relative paths were joined to.
    pub root: PathBuf,
    /// Execution cache directory.
    pub cache_path: PathBuf,
    /// Recovery state directory.
    pub recovery_dir: PathBuf,
}

/// Joins relative configured paths onto `root`; absolute paths pass through.
pub fn resolve_paths(config: &KilnConfig, root: &Path) -> ResolvedPaths {
    ResolvedPaths {
        root: root.to_path_buf(),
        cache_path: root.join(&config.cache.path),
        recovery_dir: root.join(&config.recovery.state_dir),
    }
}
