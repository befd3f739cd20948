//! The artifact specification produced by the planning layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Specification of an artifact that a generation call must produce.
///
/// The spec is the contract; the generated file or text is the
/// implementation. Specs are immutable once handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Stable unique identifier (e.g. `"UserProtocol"`).
    pub id: String,

    /// Human-readable description.
    #[serde(default)]
    pub description: String,

    /// What the artifact must satisfy: a signature, outline or schema.
    #[serde(default)]
    pub contract: String,

    /// Ids of artifacts that must exist before this one can be created.
    #[serde(default)]
    pub requires: BTreeSet<String>,

    /// Domain schema type (e.g. `"protocol"`, `"chapter"`).
    #[serde(default)]
    pub domain_type: Option<String>,

    /// File path this artifact creates or modifies.
    #[serde(default)]
    pub produces_file: Option<String>,
}

impl ArtifactSpec {
    /// Creates a spec with no dependencies and no optional fields.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        contract: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            contract: contract.into(),
            requires: BTreeSet::new(),
            domain_type: None,
            produces_file: None,
        }
    }

    /// Adds a required artifact id.
    pub fn requiring(mut self, id: impl Into<String>) -> Self {
        self.requires.insert(id.into());
        self
    }

    /// Sets the produced file path.
    pub fn producing(mut self, path: impl Into<String>) -> Self {
        self.produces_file = Some(path.into());
        self
    }

    /// Sets the domain type.
    pub fn with_domain_type(mut self, domain_type: impl Into<String>) -> Self {
        self.domain_type = Some(domain_type.into());
        self
    }

    /// Returns `true` if the artifact has no dependencies.
    pub fn is_leaf(&self) -> bool {
        self.requires.is_empty()
    }

    /// Returns `true` if the artifact defines an interface other artifacts build on.
    pub fn is_contract(&self) -> bool {
        const CONTRACT_TYPES: [&str; 5] = ["protocol", "interface", "schema", "spec", "outline"];
        self.is_leaf()
            || self
                .domain_type
                .as_deref()
                .is_some_and(|t| CONTRACT_TYPES.contains(&t))
    }
}
