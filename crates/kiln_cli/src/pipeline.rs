//! Shared helpers for CLI commands: project discovery, configuration, and
//! opening the graph, cache and recovery store.

use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};

use kiln_cache::ExecutionCache;
use kiln_config::{KilnConfig, ResolvedPaths, CONFIG_FILE_NAME};
use kiln_graph::ArtifactGraph;
use kiln_recovery::RecoveryManager;
use tracing::debug;

use crate::GlobalArgs;

/// A loaded project: its configuration and the paths derived from it.
#[derive(Debug)]
pub struct Project {
    /// The configuration in effect.
    pub config: KilnConfig,
    /// Configured paths resolved against the project root.
    pub paths: ResolvedPaths,
}

impl Project {
    /// Opens the execution cache, creating it if needed.
    pub fn open_cache(&self) -> Result<ExecutionCache, Box<dyn Error>> {
        Ok(ExecutionCache::open(&self.paths.cache_path)?)
    }

    /// A recovery manager over the configured state directory.
    pub fn recovery(&self) -> RecoveryManager {
        RecoveryManager::new(&self.paths.recovery_dir)
            .with_preview_chars(self.config.recovery.goal_preview_chars)
    }
}

/// Walks up from `start` looking for the nearest directory containing
/// `kiln.toml`.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(CONFIG_FILE_NAME).is_file())
        .map(Path::to_path_buf)
}

/// Loads the project for the current invocation.
///
/// `--config` names the file directly and its directory becomes the root.
/// Otherwise the nearest `kiln.toml` above the current directory is used, and
/// with none found the defaults apply, rooted at the current directory.
pub fn load_project(global: &GlobalArgs) -> Result<Project, Box<dyn Error>> {
    let cwd = std::env::current_dir()?;
    load_project_from(global.config.as_deref(), &cwd)
}

fn load_project_from(config_path: Option<&Path>, cwd: &Path) -> Result<Project, Box<dyn Error>> {
    let (root, config) = match config_path {
        Some(path) => {
            let path = cwd.join(path);
            let config = kiln_config::load_config_file(&path)
                .map_err(|e| format!("{}: {e}", path.display()))?;
            let root = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| cwd.to_path_buf());
            (root, config)
        }
        None => match find_project_root(cwd) {
            Some(root) => {
                let config = kiln_config::load_config(&root)
                    .map_err(|e| format!("{}: {e}", root.join(CONFIG_FILE_NAME).display()))?;
                (root, config)
            }
            None => (cwd.to_path_buf(), KilnConfig::default()),
        },
    };
    debug!(root = %root.display(), "loaded project configuration");
    let paths = kiln_config::resolve_paths(&config, &root);
    Ok(Project { config, paths })
}

/// Reads an artifact graph file.
pub fn load_graph(path: &Path) -> Result<ArtifactGraph, Box<dyn Error>> {
    let json = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    let graph = ArtifactGraph::from_json(&json).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(graph)
}

/// Collects `--force` ids, rejecting any the graph does not contain.
pub fn force_set(graph: &ArtifactGraph, ids: &[String]) -> Result<BTreeSet<String>, Box<dyn Error>> {
    if let Some(unknown) = ids.iter().find(|id| !graph.contains(id)) {
        return Err(format!("--force names unknown artifact '{unknown}'").into());
    }
    Ok(ids.iter().cloned().collect())
}

/// Prints graph problems (such as unresolved requires) as warnings.
pub fn report_graph_problems(graph: &ArtifactGraph, global: &GlobalArgs) {
    if global.quiet {
        return;
    }
    for problem in graph.validate() {
        eprintln!("warning: {problem}");
    }
}

/// Prints a value as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
