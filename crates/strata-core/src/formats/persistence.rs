//! # Persistence Format
//!
//! Binary dump of a whole model.
//!
//! Format: Header (5 bytes) + postcard-serialized statement list.
//! - 4 bytes: Magic ("STRA")
//! - 1 byte: Version
//!
//! The size limit and the header are checked before the payload is decoded,
//! so corrupted or hostile input fails early without large allocations.
//! Statements are dumped in model order; for the built-in stores that is
//! `Statement` order, so dumps of equal content are bit-identical.

use crate::model::Model;
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_DUMP_SIZE};
use crate::types::{Statement, StrataError};
use serde::{Deserialize, Serialize};

/// Header length in bytes.
const HEADER_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding every dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Create a header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), StrataError> {
        if &self.magic != MAGIC_BYTES {
            return Err(StrataError::SerializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(StrataError::SerializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StrataError> {
        let Some(header) = bytes.get(..HEADER_SIZE) else {
            return Err(StrataError::SerializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize, Deserialize)]
struct DumpPayload {
    statements: Vec<Statement>,
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize statements to bytes (header + payload).
pub fn statements_to_bytes(statements: Vec<Statement>) -> Result<Vec<u8>, StrataError> {
    let payload = postcard::to_stdvec(&DumpPayload { statements })
        .map_err(|e| StrataError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_SIZE + payload.len());
    result.extend_from_slice(&PersistenceHeader::new().to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize statements from a dump.
///
/// Validates the size bounds and the header before touching the payload.
pub fn statements_from_bytes(bytes: &[u8]) -> Result<Vec<Statement>, StrataError> {
    if bytes.len() < HEADER_SIZE {
        return Err(StrataError::SerializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_SIZE
        )));
    }
    if bytes.len() > MAX_DUMP_SIZE {
        return Err(StrataError::SerializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_DUMP_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    let payload: DumpPayload = postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        StrataError::SerializationError(format!("Failed to deserialize dump: {}", e))
    })?;
    Ok(payload.statements)
}

/// Dump every statement of `model`.
pub fn dump_to_bytes<M: Model + ?Sized>(model: &M) -> Result<Vec<u8>, StrataError> {
    let statements = model.list_all_statements()?.collect_all()?;
    tracing::debug!(statements = statements.len(), "model dumped");
    statements_to_bytes(statements)
}

/// Add every statement of a dump to `model`. Returns the number read.
///
/// The whole dump is decoded and validated before anything is written.
pub fn load_from_bytes<M: Model + ?Sized>(model: &mut M, bytes: &[u8]) -> Result<usize, StrataError> {
    let statements = statements_from_bytes(bytes)?;
    if let Some(invalid) = statements.iter().find(|s| !s.is_valid()) {
        return Err(StrataError::SerializationError(format!(
            "Dump contains an invalid statement: {}",
            invalid
        )));
    }
    model.add_statements(&statements)?;
    Ok(statements.len())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryStore;
    use crate::types::{ErrorKind, Node};

    fn sample() -> MemoryStore {
        let mut store = MemoryStore::new();
        store
            .add_statements(&[
                Statement::new(
                    Node::resource("http://a"),
                    Node::resource("http://p"),
                    Node::lang_literal("hallo", "de"),
                ),
                Statement::with_context(
                    Node::blank("b0"),
                    Node::resource("http://p"),
                    Node::typed_literal("5", "http://www.w3.org/2001/XMLSchema#integer"),
                    Node::resource("http://g"),
                ),
            ])
            .expect("seed");
        store
    }

    #[test]
    fn header_roundtrip() {
        let bytes = PersistenceHeader::new().to_bytes();
        let restored = PersistenceHeader::from_bytes(&bytes).expect("parse header");
        assert_eq!(restored, PersistenceHeader::new());
        assert!(restored.validate().is_ok());
    }

    #[test]
    fn dump_and_load_preserve_content() {
        let source = sample();
        let bytes = dump_to_bytes(&source).expect("dump");
        assert_eq!(&bytes[0..4], MAGIC_BYTES);

        let mut target = MemoryStore::new();
        assert_eq!(load_from_bytes(&mut target, &bytes).expect("load"), 2);
        assert_eq!(target.snapshot(), source.snapshot());
    }

    #[test]
    fn dumps_are_deterministic() {
        let first = dump_to_bytes(&sample()).expect("dump");
        let second = dump_to_bytes(&sample()).expect("dump");
        assert_eq!(first, second);
    }

    #[test]
    fn rejects_bad_magic_and_version() {
        let mut bytes = dump_to_bytes(&sample()).expect("dump");
        bytes[0] = b'X';
        let err = statements_from_bytes(&bytes).expect_err("magic");
        assert_eq!(err.kind(), ErrorKind::Parsing);

        let mut bytes = dump_to_bytes(&sample()).expect("dump");
        bytes[4] = FORMAT_VERSION + 1;
        assert!(statements_from_bytes(&bytes).is_err());
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(statements_from_bytes(b"STR").is_err());
        let bytes = dump_to_bytes(&sample()).expect("dump");
        assert!(statements_from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn invalid_statements_abort_before_writing() {
        let bytes = statements_to_bytes(vec![
            Statement::new(
                Node::resource("http://a"),
                Node::resource("http://p"),
                Node::resource("http://b"),
            ),
            Statement::new(
                Node::literal("subject"),
                Node::resource("http://p"),
                Node::resource("http://b"),
            ),
        ])
        .expect("encode");
        let mut target = MemoryStore::new();
        assert!(load_from_bytes(&mut target, &bytes).is_err());
        assert!(target.is_empty().expect("untouched"));
    }
}
