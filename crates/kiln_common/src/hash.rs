//! Content hashing for cache invalidation and incremental execution.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Number of hex characters shown by [`ContentHash::short`].
const SHORT_HEX_LEN: usize = 16;

/// A 256-bit content hash computed using SHA-256.
///
/// Two artifacts with the same `ContentHash` are assumed to have identical
/// definitions and identical upstream inputs. A collision would silently reuse
/// a stale result, so the hash is cryptographic rather than a fast checksum.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Computes a content hash from a byte slice.
    pub fn from_bytes(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Computes a content hash of a UTF-8 string.
    pub fn from_str_content(data: &str) -> Self {
        Self::from_bytes(data.as_bytes())
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the first 16 hex characters, for display in tables and logs.
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(SHORT_HEX_LEN);
        s
    }

    /// Parses a 64-character lowercase or uppercase hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Incremental builder that feeds tagged, length-prefixed fields into SHA-256.
///
/// Each field is written as `tag`, the value length, then the value, so
/// `("ab", "c")` and `("a", "bc")` produce different digests.
pub struct ContentHasher {
    inner: Sha256,
}

impl ContentHasher {
    /// Creates a hasher seeded with a domain label.
    pub fn new(domain: &str) -> Self {
        let mut hasher = Self {
            inner: Sha256::new(),
        };
        hasher.field("domain", domain);
        hasher
    }

    /// Feeds a named string field.
    pub fn field(&mut self, tag: &str, value: &str) -> &mut Self {
        self.raw(tag.as_bytes());
        self.raw(value.as_bytes());
        self
    }

    /// Feeds an optional string field, distinguishing `None` from `Some("")`.
    pub fn optional(&mut self, tag: &str, value: Option<&str>) -> &mut Self {
        match value {
            Some(v) => {
                self.raw(tag.as_bytes());
                self.raw(&[1]);
                self.raw(v.as_bytes());
            }
            None => {
                self.raw(tag.as_bytes());
                self.raw(&[0]);
            }
        }
        self
    }

    /// Feeds a named hash field.
    pub fn hash(&mut self, tag: &str, value: &ContentHash) -> &mut Self {
        self.raw(tag.as_bytes());
        self.raw(value.as_bytes());
        self
    }

    /// Finishes hashing and returns the digest.
    pub fn finish(self) -> ContentHash {
        ContentHash(self.inner.finalize().into())
    }

    fn raw(&mut self, bytes: &[u8]) {
        self.inner.update((bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
    }
}

/// Derives the recovery key for a goal: the short hash of its trimmed text.
///
/// The result is lowercase hex and therefore always safe to use as a filename.
pub fn goal_hash(goal: &str) -> String {
    ContentHash::from_str_content(goal.trim()).short()
}
