//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::KilnConfig;
use std::path::Path;

/// File name looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "kiln.toml";

/// Loads and validates `<project_dir>/kiln.toml`.
pub fn load_config(project_dir: &Path) -> Result<KilnConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE_NAME))
}

/// Loads and validates a configuration file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<KilnConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_from_str(&content)
}

/// Parses and validates a `kiln.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<KilnConfig, ConfigError> {
    let config: KilnConfig =
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configured values are usable.
fn validate_config(config: &KilnConfig) -> Result<(), ConfigError> {
    if config.cache.path.as_os_str().is_empty() {
        return Err(ConfigError::Invalid {
            field: "cache.path",
            reason: "must not be empty",
        });
    }
    if config.recovery.state_dir.as_os_str().is_empty() {
        return Err(ConfigError::Invalid {
            field: "recovery.state_dir",
            reason: "must not be empty",
        });
    }
    if config.recovery.goal_preview_chars == 0 {
        return Err(ConfigError::Invalid {
            field: "recovery.goal_preview_chars",
            reason: "must be at least 1",
        });
    }
    Ok(())
}
