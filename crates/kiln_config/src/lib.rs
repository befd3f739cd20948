//! Parsing and validation of `kiln.toml` project configuration files.
//!
//! Every section and field has a default, so a missing or empty file yields a
//! usable [`KilnConfig`]. Relative paths are resolved against the directory
//! holding the file with [`resolve_paths`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod resolve;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_file, load_config_from_str, CONFIG_FILE_NAME};
pub use resolve::{resolve_paths, ResolvedPaths};
pub use types::*;
