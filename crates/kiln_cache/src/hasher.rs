//! Artifact input fingerprinting.
//!
//! An artifact's input hash covers its own definition plus the input hashes of
//! everything it depends on, so a change anywhere upstream changes every hash
//! downstream of it.

use std::collections::HashMap;

use kiln_common::{ContentHash, ContentHasher};
use kiln_graph::ArtifactSpec;

const SPEC_DOMAIN: &str = "kiln.artifact.spec.v1";
const INPUT_DOMAIN: &str = "kiln.artifact.input.v1";

/// Hashes the fields of an artifact definition, ignoring its dependencies' state.
///
/// Covers the id, description, contract, the sorted set of required ids and the
/// optional output path and domain type.
pub fn compute_spec_hash(spec: &ArtifactSpec) -> ContentHash {
    let mut hasher = ContentHasher::new(SPEC_DOMAIN);
    hasher
        .field("id", &spec.id)
        .field("description", &spec.description)
        .field("contract", &spec.contract)
        .field("requires_len", &spec.requires.len().to_string());
    for required in &spec.requires {
        hasher.field("requires", required);
    }
    hasher
        .optional("produces_file", spec.produces_file.as_deref())
        .optional("domain_type", spec.domain_type.as_deref());
    hasher.finish()
}

/// Computes the input hash of an artifact.
///
/// `dependency_hashes` maps dependency ids to their input hashes. Entries are
/// fed in id order, so the result does not depend on map iteration order.
/// Only the entries supplied are hashed; callers pass the hashes of the
/// dependencies that exist in the graph.
pub fn compute_input_hash(
    spec: &ArtifactSpec,
    dependency_hashes: &HashMap<String, ContentHash>,
) -> ContentHash {
    let mut deps: Vec<(&String, &ContentHash)> = dependency_hashes.iter().collect();
    deps.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = ContentHasher::new(INPUT_DOMAIN);
    hasher
        .hash("spec", &compute_spec_hash(spec))
        .field("deps_len", &deps.len().to_string());
    for (id, hash) in deps {
        hasher.field("dep", id).hash("dep_hash", hash);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ArtifactSpec {
        ArtifactSpec::new("UserService", "User service", "class UserService")
            .requiring("UserModel")
            .requiring("Database")
    }

    fn deps(pairs: &[(&str, &str)]) -> HashMap<String, ContentHash> {
        pairs
            .iter()
            .map(|(id, content)| (id.to_string(), ContentHash::from_str_content(content)))
            .collect()
    }

    #[test]
    fn deterministic() {
        let d = deps(&[("UserModel", "m"), ("Database", "d")]);
        assert_eq!(compute_input_hash(&spec(), &d), compute_input_hash(&spec(), &d));
    }

    #[test]
    fn dependency_order_irrelevant() {
        let mut forward = HashMap::new();
        forward.insert("Database".to_string(), ContentHash::from_str_content("d"));
        forward.insert("UserModel".to_string(), ContentHash::from_str_content("m"));
        let mut backward = HashMap::with_capacity(8);
        backward.insert("UserModel".to_string(), ContentHash::from_str_content("m"));
        backward.insert("Database".to_string(), ContentHash::from_str_content("d"));
        assert_eq!(
            compute_input_hash(&spec(), &forward),
            compute_input_hash(&spec(), &backward)
        );
    }

    #[test]
    fn requires_order_irrelevant() {
        let a = ArtifactSpec::new("X", "d", "c").requiring("B").requiring("A");
        let b = ArtifactSpec::new("X", "d", "c").requiring("A").requiring("B");
        assert_eq!(compute_spec_hash(&a), compute_spec_hash(&b));
    }

    #[test]
    fn contract_change_changes_hash() {
        let d = deps(&[("UserModel", "m")]);
        let mut changed = spec();
        changed.contract = "class UserService(Base)".to_string();
        assert_ne!(compute_input_hash(&spec(), &d), compute_input_hash(&changed, &d));
    }

    #[test]
    fn description_change_changes_hash() {
        let mut changed = spec();
        changed.description.push('!');
        assert_ne!(compute_spec_hash(&spec()), compute_spec_hash(&changed));
    }

    #[test]
    fn optional_fields_affect_hash() {
        let plain = ArtifactSpec::new("A", "d", "c");
        let with_file = plain.clone().producing("a.py");
        let with_type = plain.clone().with_domain_type("model");
        assert_ne!(compute_spec_hash(&plain), compute_spec_hash(&with_file));
        assert_ne!(compute_spec_hash(&plain), compute_spec_hash(&with_type));
        assert_ne!(compute_spec_hash(&with_file), compute_spec_hash(&with_type));
    }

    #[test]
    fn dependency_hash_change_changes_hash() {
        let before = deps(&[("UserModel", "v1")]);
        let after = deps(&[("UserModel", "v2")]);
        assert_ne!(
            compute_input_hash(&spec(), &before),
            compute_input_hash(&spec(), &after)
        );
    }

    #[test]
    fn dependency_set_change_changes_hash() {
        let one = deps(&[("UserModel", "m")]);
        let two = deps(&[("UserModel", "m"), ("Database", "d")]);
        assert_ne!(compute_input_hash(&spec(), &one), compute_input_hash(&spec(), &two));
    }

    #[test]
    fn input_hash_differs_from_spec_hash() {
        let s = ArtifactSpec::new("A", "d", "c");
        assert_ne!(compute_input_hash(&s, &HashMap::new()), compute_spec_hash(&s));
    }
}
