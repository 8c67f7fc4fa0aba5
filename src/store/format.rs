//! On-disk artifact formats of a snapshot.
//!
//! `vectors.bin` is a little-endian binary layout:
//!
//! ```text
//! magic   [u8; 4]  "RSVX"
//! version u16      1
//! dim     u32
//! count   u64
//! data    [f32; count * dim]   row-major
//! ```
//!
//! The block text and provenance tables are versioned JSON documents with an
//! explicit record count, so any language can read them.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::{Result, RetrievalError};
use crate::index::VectorIndex;

pub const VECTORS_MAGIC: [u8; 4] = *b"RSVX";
pub const VECTORS_VERSION: u16 = 1;
pub const TABLE_VERSION: u32 = 1;

pub const BLOCKS_FORMAT: &str = "ragstation.blocks";
pub const PROVENANCE_FORMAT: &str = "ragstation.provenance";

const HEADER_LEN: usize = 4 + 2 + 4 + 8;

/// Source attribution of one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub source_path: String,
    pub ordinal: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Table<T> {
    format: String,
    version: u32,
    count: usize,
    records: Vec<T>,
}

pub fn encode_vectors(index: &VectorIndex) -> Vec<u8> {
    let raw = index.as_raw();
    let mut buffer = Vec::with_capacity(HEADER_LEN + raw.len() * 4);

    buffer.extend_from_slice(&VECTORS_MAGIC);
    buffer.extend_from_slice(&VECTORS_VERSION.to_le_bytes());
    buffer.extend_from_slice(&(index.dimension() as u32).to_le_bytes());
    buffer.extend_from_slice(&(index.len() as u64).to_le_bytes());
    for value in raw {
        buffer.extend_from_slice(&value.to_le_bytes());
    }

    buffer
}

pub fn decode_vectors(bytes: &[u8], path: &Path) -> Result<VectorIndex> {
    if bytes.len() < HEADER_LEN {
        return Err(RetrievalError::corrupt(path, "vector file shorter than header"));
    }
    if bytes[0..4] != VECTORS_MAGIC {
        return Err(RetrievalError::corrupt(path, "invalid vector file magic"));
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != VECTORS_VERSION {
        return Err(RetrievalError::corrupt(
            path,
            format!("unsupported vector format version {}", version),
        ));
    }

    let dimension = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let mut count_bytes = [0u8; 8];
    count_bytes.copy_from_slice(&bytes[10..18]);
    let count = u64::from_le_bytes(count_bytes) as usize;

    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .and_then(|n| n.checked_add(HEADER_LEN))
        .ok_or_else(|| RetrievalError::corrupt(path, "vector header sizes overflow"))?;
    if bytes.len() != expected {
        return Err(RetrievalError::corrupt(
            path,
            format!(
                "vector file is {} bytes, header promises {} ({} x {})",
                bytes.len(),
                expected,
                count,
                dimension
            ),
        ));
    }
    if count > 0 && dimension == 0 {
        return Err(RetrievalError::corrupt(path, "zero dimension with non-zero count"));
    }

    let data: Vec<f32> = bytes[HEADER_LEN..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    VectorIndex::from_raw(dimension, data)
        .map_err(|e| RetrievalError::corrupt(path, e.to_string()))
}

pub fn encode_table<T: Serialize>(format: &str, records: Vec<T>) -> Result<Vec<u8>> {
    let table = Table {
        format: format.to_string(),
        version: TABLE_VERSION,
        count: records.len(),
        records,
    };
    Ok(serde_json::to_vec(&table)?)
}

pub fn decode_table<T: DeserializeOwned>(bytes: &[u8], format: &str, path: &Path) -> Result<Vec<T>> {
    let table: Table<T> = serde_json::from_slice(bytes)
        .map_err(|e| RetrievalError::corrupt(path, format!("unreadable table: {}", e)))?;

    if table.format != format {
        return Err(RetrievalError::corrupt(
            path,
            format!("expected {} table, found {}", format, table.format),
        ));
    }
    if table.version != TABLE_VERSION {
        return Err(RetrievalError::corrupt(
            path,
            format!("unsupported table version {}", table.version),
        ));
    }
    if table.count != table.records.len() {
        return Err(RetrievalError::corrupt(
            path,
            format!(
                "table declares {} records but holds {}",
                table.count,
                table.records.len()
            ),
        ));
    }

    Ok(table.records)
}
