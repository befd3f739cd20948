//! Framed binary encoding for stored cache records.
//!
//! Every value written to the store is prefixed with a header carrying magic
//! bytes, a format version, and a checksum of the payload. Decoding validates
//! all three, so a truncated, foreign, or outdated record is rejected rather
//! than misread.

use kiln_common::ContentHash;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a kiln cache record.
const RECORD_MAGIC: [u8; 4] = *b"KILN";

/// Current record format version. Increment on breaking changes to
/// the header or any stored type.
pub const RECORD_FORMAT_VERSION: u32 = 1;

/// Header prepended to every stored record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Magic bytes: must be `b"KILN"`.
    pub magic: [u8; 4],

    /// Record format version.
    pub format_version: u32,

    /// Content hash of the payload bytes.
    pub checksum: ContentHash,
}

/// Encodes a value as `header length (u32 LE) + header + payload`.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CacheError> {
    let payload = bincode::serde::encode_to_vec(value, bincode::config::standard()).map_err(
        |e| CacheError::Serialization {
            reason: e.to_string(),
        },
    )?;

    let header = RecordHeader {
        magic: RECORD_MAGIC,
        format_version: RECORD_FORMAT_VERSION,
        checksum: ContentHash::from_bytes(&payload),
    };
    let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;

    let header_len = header_bytes.len() as u32;
    let mut output = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    output.extend_from_slice(&header_len.to_le_bytes());
    output.extend_from_slice(&header_bytes);
    output.extend_from_slice(&payload);
    Ok(output)
}

/// Decodes a record produced by [`encode`], validating its header.
///
/// `key` only labels errors.
pub fn decode<T: DeserializeOwned>(key: &str, raw: &[u8]) -> Result<T, CacheError> {
    let invalid = |reason: &str| CacheError::InvalidHeader {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let len_bytes: [u8; 4] = raw
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| invalid("record shorter than length prefix"))?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_bytes = raw
        .get(4..4 + header_len)
        .ok_or_else(|| invalid("record shorter than declared header"))?;

    let (header, _): (RecordHeader, usize) =
        bincode::serde::decode_from_slice(header_bytes, bincode::config::standard())
            .map_err(|e| invalid(&e.to_string()))?;

    if header.magic != RECORD_MAGIC {
        return Err(invalid("missing magic bytes"));
    }
    if header.format_version != RECORD_FORMAT_VERSION {
        return Err(CacheError::VersionMismatch {
            key: key.to_string(),
            expected: RECORD_FORMAT_VERSION,
            actual: header.format_version,
        });
    }

    let payload = &raw[4 + header_len..];
    let actual = ContentHash::from_bytes(payload);
    if actual != header.checksum {
        return Err(CacheError::ChecksumMismatch {
            key: key.to_string(),
            expected: header.checksum.to_string(),
            actual: actual.to_string(),
        });
    }

    let (value, _) = bincode::serde::decode_from_slice(payload, bincode::config::standard())
        .map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
    Ok(value)
}
