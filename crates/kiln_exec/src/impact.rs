//! Blast-radius queries.

use kiln_graph::ArtifactGraph;
use serde::{Deserialize, Serialize};

use crate::error::ExecError;

/// Artifacts affected by a change to one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// The artifact being changed.
    pub artifact: String,
    /// Artifacts that require it directly.
    pub direct_dependents: Vec<String>,
    /// Every artifact downstream of it, closest first. These are invalidated
    /// when it changes.
    pub transitive_dependents: Vec<String>,
}

/// Reports which artifacts a change to `id` would invalidate.
pub fn impact_analysis(graph: &ArtifactGraph, id: &str) -> Result<ImpactReport, ExecError> {
    if !graph.contains(id) {
        return Err(ExecError::UnknownArtifact(id.to_string()));
    }
    Ok(ImpactReport {
        artifact: id.to_string(),
        direct_dependents: graph.dependents(id).into_iter().map(str::to_string).collect(),
        transitive_dependents: graph
            .transitive_dependents(id)
            .into_iter()
            .map(str::to_string)
            .collect(),
    })
}
