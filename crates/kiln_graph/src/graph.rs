//! The artifact dependency graph.
//!
//! Edges point from a dependency to the artifact that requires it, so walking
//! outgoing edges answers "what is invalidated if this changes?". A `requires`
//! entry naming an artifact that is not in the graph produces no edge; such an
//! artifact is permanently unsatisfied and is reported by [`ArtifactGraph::unresolved`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::algo::{has_path_connecting, DfsSpace};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::spec::ArtifactSpec;

/// On-disk form of a graph: `{"artifacts": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
struct GraphDocument {
    artifacts: Vec<ArtifactSpec>,
}

/// Directed acyclic graph of artifacts keyed by id.
#[derive(Debug, Default, Clone)]
pub struct ArtifactGraph {
    specs: BTreeMap<String, ArtifactSpec>,
    nodes: HashMap<String, NodeIndex>,
    edges: DiGraph<String, ()>,
}

impl ArtifactGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from specs in any order.
    pub fn from_specs(specs: impl IntoIterator<Item = ArtifactSpec>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for spec in specs {
            graph.add(spec)?;
        }
        Ok(graph)
    }

    /// Parses a graph document of the form `{"artifacts": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let doc: GraphDocument =
            serde_json::from_str(json).map_err(|e| GraphError::Parse(e.to_string()))?;
        Self::from_specs(doc.artifacts)
    }

    /// Serializes the graph back into its document form, artifacts sorted by id.
    pub fn to_json(&self) -> Result<String, GraphError> {
        let doc = GraphDocument {
            artifacts: self.specs.values().cloned().collect(),
        };
        serde_json::to_string_pretty(&doc).map_err(|e| GraphError::Parse(e.to_string()))
    }

    /// Adds an artifact.
    ///
    /// Requirements may name artifacts that are added later. The insertion is
    /// rejected, leaving the graph untouched, if the id is empty or taken, or if
    /// the new edges would close a cycle.
    pub fn add(&mut self, spec: ArtifactSpec) -> Result<(), GraphError> {
        if spec.id.is_empty() {
            return Err(GraphError::EmptyId);
        }
        if self.specs.contains_key(&spec.id) {
            return Err(GraphError::DuplicateArtifact(spec.id));
        }
        if spec.requires.contains(&spec.id) {
            return Err(GraphError::Cycle {
                path: vec![spec.id.clone(), spec.id],
            });
        }

        let sources: Vec<NodeIndex> = spec
            .requires
            .iter()
            .filter_map(|req| self.nodes.get(req).copied())
            .collect();
        let targets: Vec<NodeIndex> = self
            .specs
            .values()
            .filter(|other| other.requires.contains(&spec.id))
            .filter_map(|other| self.nodes.get(&other.id).copied())
            .collect();

        if let Some(path) = self.closing_path(&targets, &sources) {
            let mut cycle = Vec::with_capacity(path.len() + 2);
            cycle.push(spec.id.clone());
            cycle.extend(path.into_iter().map(|n| self.edges[n].clone()));
            cycle.push(spec.id.clone());
            return Err(GraphError::Cycle { path: cycle });
        }

        let node = self.edges.add_node(spec.id.clone());
        for source in sources {
            self.edges.add_edge(source, node, ());
        }
        for target in targets {
            self.edges.add_edge(node, target, ());
        }
        self.nodes.insert(spec.id.clone(), node);
        self.specs.insert(spec.id.clone(), spec);
        Ok(())
    }

    /// Finds an existing path from any of `from` to any of `to`.
    fn closing_path(&self, from: &[NodeIndex], to: &[NodeIndex]) -> Option<Vec<NodeIndex>> {
        let mut space = DfsSpace::new(&self.edges);
        for &start in from {
            for &end in to {
                if has_path_connecting(&self.edges, start, end, Some(&mut space)) {
                    return Some(self.shortest_path(start, end));
                }
            }
        }
        None
    }

    /// Breadth-first walk from `start`, then back along predecessors from `end`.
    ///
    /// Callers must already know that `end` is reachable.
    fn shortest_path(&self, start: NodeIndex, end: NodeIndex) -> Vec<NodeIndex> {
        let mut previous: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == end {
                break;
            }
            for next in self.edges.neighbors_directed(node, Outgoing) {
                if next != start && !previous.contains_key(&next) {
                    previous.insert(next, node);
                    queue.push_back(next);
                }
            }
        }

        let mut path = vec![end];
        let mut cursor = end;
        while let Some(&prev) = previous.get(&cursor) {
            path.push(prev);
            cursor = prev;
        }
        path.reverse();
        path
    }

    /// Returns the spec for an id.
    pub fn get(&self, id: &str) -> Option<&ArtifactSpec> {
        self.specs.get(id)
    }

    /// Returns `true` if the graph holds an artifact with this id.
    pub fn contains(&self, id: &str) -> bool {
        self.specs.contains_key(id)
    }

    /// Number of artifacts.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` if the graph has no artifacts.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// All artifact ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// All specs, sorted by id.
    pub fn specs(&self) -> impl Iterator<Item = &ArtifactSpec> {
        self.specs.values()
    }

    /// Direct dependencies of an artifact that resolve to artifacts in the graph.
    pub fn dependencies(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Incoming)
    }

    /// Requirements of an artifact that name no artifact in the graph.
    pub fn unresolved(&self, id: &str) -> Vec<&str> {
        self.specs
            .get(id)
            .map(|spec| {
                spec.requires
                    .iter()
                    .filter(|req| !self.specs.contains_key(*req))
                    .map(String::as_str)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Artifacts that directly require this one, sorted.
    pub fn dependents(&self, id: &str) -> Vec<&str> {
        self.neighbors(id, Outgoing)
    }

    fn neighbors(&self, id: &str, direction: petgraph::Direction) -> Vec<&str> {
        let Some(&node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .edges
            .neighbors_directed(node, direction)
            .map(|n| self.edges[n].as_str())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every artifact that transitively requires this one, closest first.
    ///
    /// Artifacts at the same distance are sorted by id.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut out = Vec::new();
        let mut frontier = self.dependents(id);
        while !frontier.is_empty() {
            let mut next = BTreeSet::new();
            for dependent in frontier {
                if seen.insert(dependent) {
                    out.push(dependent);
                    next.extend(self.dependents(dependent));
                }
            }
            frontier = next.into_iter().filter(|d| !seen.contains(d)).collect();
        }
        out
    }

    /// Artifacts with no requirements at all.
    pub fn leaves(&self) -> Vec<&str> {
        self.specs
            .values()
            .filter(|s| s.is_leaf())
            .map(|s| s.id.as_str())
            .collect()
    }

    /// Artifacts nothing depends on: the convergence points of the graph.
    pub fn roots(&self) -> Vec<&str> {
        self.ids()
            .filter(|id| self.dependents(id).is_empty())
            .collect()
    }

    /// Length of the longest resolved dependency chain below an artifact.
    ///
    /// Leaves have depth 0. Returns `None` for unknown ids.
    pub fn depth(&self, id: &str) -> Option<usize> {
        fn walk<'g>(
            graph: &'g ArtifactGraph,
            id: &'g str,
            memo: &mut HashMap<&'g str, usize>,
        ) -> usize {
            if let Some(&d) = memo.get(id) {
                return d;
            }
            let d = graph
                .dependencies(id)
                .into_iter()
                .map(|dep| walk(graph, dep, memo) + 1)
                .max()
                .unwrap_or(0);
            memo.insert(id, d);
            d
        }

        if !self.contains(id) {
            return None;
        }
        let mut memo = HashMap::new();
        Some(walk(self, id, &mut memo))
    }

    /// Groups artifacts into waves whose resolved dependencies all lie in earlier waves.
    ///
    /// Artifacts within a wave are independent of one another and sorted by id,
    /// so the grouping is stable across runs.
    pub fn execution_waves(&self) -> Vec<Vec<&str>> {
        let mut remaining: BTreeMap<&str, usize> = self
            .ids()
            .map(|id| (id, self.dependencies(id).len()))
            .collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|&(_, &deg)| deg == 0)
                .map(|(&id, _)| id)
                .collect();
            if ready.is_empty() {
                // Unreachable: insertion rejects cycles.
                break;
            }
            for id in &ready {
                remaining.remove(id);
                for dependent in self.dependents(id) {
                    if let Some(deg) = remaining.get_mut(dependent) {
                        *deg -= 1;
                    }
                }
            }
            waves.push(ready);
        }
        waves
    }

    /// All artifacts in dependency order (wave by wave).
    pub fn topological_order(&self) -> Vec<&str> {
        self.execution_waves().into_iter().flatten().collect()
    }

    /// Describes consistency problems; an empty list means the graph is complete.
    pub fn validate(&self) -> Vec<String> {
        self.ids()
            .filter_map(|id| {
                let missing = self.unresolved(id);
                (!missing.is_empty()).then(|| {
                    format!(
                        "artifact '{id}' requires non-existent artifacts: {}",
                        missing.join(", ")
                    )
                })
            })
            .collect()
    }
}
