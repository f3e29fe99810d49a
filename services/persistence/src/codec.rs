//! Checksummed value codec
//!
//! Every stored record is framed as:
//!
//! ```text
//! [bincode body: N bytes][crc32c(body): u32 LE]
//! ```
//!
//! A record that fails its checksum is never handed back to the caller.

use crc32c::crc32c;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

const CHECKSUM_LEN: usize = 4;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Record truncated: {len} bytes")]
    Truncated { len: usize },

    #[error("Checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

// ── Encode / decode ─────────────────────────────────────────────────

/// Serialize a record and append its checksum.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf =
        bincode::serialize(value).map_err(|e| CodecError::Serialization(e.to_string()))?;
    let checksum = crc32c(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    Ok(buf)
}

/// Verify the trailer and deserialize the body.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    if bytes.len() < CHECKSUM_LEN {
        return Err(CodecError::Truncated { len: bytes.len() });
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = crc32c(body);
    if expected != actual {
        return Err(CodecError::ChecksumMismatch { expected, actual });
    }
    bincode::deserialize(body).map_err(|e| CodecError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        id: u64,
        owner: String,
        flags: Vec<bool>,
    }

    fn sample() -> Record {
        Record {
            id: 7,
            owner: "alice".into(),
            flags: vec![true, false],
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode(&sample()).unwrap();
        let back: Record = decode(&bytes).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn test_flipped_bit_detected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] ^= 0x01;
        let result: Result<Record, _> = decode(&bytes);
        assert!(matches!(result, Err(CodecError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_truncated_record() {
        let result: Result<Record, _> = decode(&[1, 2]);
        assert_eq!(result, Err(CodecError::Truncated { len: 2 }));
    }

    #[test]
    fn test_wrong_type_is_serialization_error() {
        let bytes = encode(&1u8).unwrap();
        let result: Result<Record, _> = decode(&bytes);
        assert!(matches!(result, Err(CodecError::Serialization(_))));
    }
}
