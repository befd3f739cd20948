//! Configuration types deserialized from `kiln.toml`.

use serde::Deserialize;
use std::path::PathBuf;

/// The top-level configuration parsed from `kiln.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct KilnConfig {
    /// Execution cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Recovery document settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
    /// Executor behaviour.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Work deduplication settings.
    #[serde(default)]
    pub dedupe: DedupeConfig,
}

/// Where the execution cache lives.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Directory of the embedded store, relative to the project root unless
    /// absolute.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from(".kiln/cache/execution.db")
}

/// Where recovery documents are kept and how they are listed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
    /// Directory holding one JSON document per failed goal.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    /// Characters of goal text shown in listings.
    #[serde(default = "default_preview_chars")]
    pub goal_preview_chars: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            goal_preview_chars: default_preview_chars(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".kiln/recovery")
}

fn default_preview_chars() -> usize {
    100
}

/// Executor behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Run independent artifacts of the same wave in parallel.
    #[serde(default = "enabled")]
    pub parallel: bool,
    /// Route creation calls through a work deduper.
    #[serde(default = "enabled")]
    pub dedupe: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            dedupe: true,
        }
    }
}

fn enabled() -> bool {
    true
}

/// Work deduplication settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DedupeConfig {
    /// Keep successful results after the flight settles, until cleared.
    #[serde(default)]
    pub retain_results: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = KilnConfig::default();
        assert_eq!(config.cache.path, PathBuf::from(".kiln/cache/execution.db"));
        assert_eq!(config.recovery.state_dir, PathBuf::from(".kiln/recovery"));
        assert_eq!(config.recovery.goal_preview_chars, 100);
        assert!(config.executor.parallel);
        assert!(config.executor.dedupe);
        assert!(!config.dedupe.retain_results);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: KilnConfig = toml::from_str("[executor]\nparallel = false\n").unwrap();
        assert!(!config.executor.parallel);
        assert!(config.executor.dedupe);
        assert_eq!(config.recovery, RecoveryConfig::default());
    }
}
