//! Shared foundational types used across the kiln incremental execution engine.
//!
//! This crate provides the content hash used to fingerprint artifacts and
//! the helper that derives recovery keys from goal text.

#![warn(missing_docs)]

pub mod hash;

pub use hash::{goal_hash, ContentHash, ContentHasher};
