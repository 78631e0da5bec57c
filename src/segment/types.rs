//! Core types and constants for the segment file format

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Magic bytes at the start of every segment file
pub const SEGMENT_MAGIC: &[u8; 4] = b"ZAP\0";

/// Current segment format version
pub const SEGMENT_VERSION: u32 = 1;

/// Documents per chunk for stored fields
pub const CHUNK_SIZE: u64 = 1024;

/// Reserved field that maps each external id token to its docnum
pub const ID_FIELD: &str = "_id";

/// Top bit of an FST value marks an inline one-hit docnum
pub const ONE_HIT_FLAG: u64 = 1 << 63;

/// A document as supplied by the caller and kept in the stored region.
///
/// Only string-valued fields are indexed; other value types are stored for
/// round-trip but ignored by the tokenizer.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Check whether an FST value is a one-hit encoding
pub fn is_one_hit(value: u64) -> bool {
    value & ONE_HIT_FLAG != 0
}

/// Extract the docnum from a one-hit FST value
pub fn decode_one_hit(value: u64) -> u64 {
    value & !ONE_HIT_FLAG
}

/// Encode a docnum as a one-hit FST value
pub fn encode_one_hit(doc_num: u64) -> u64 {
    doc_num | ONE_HIT_FLAG
}

/// A single posting: one `(field, term, document)` occurrence list
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Posting {
    /// Dense document number within the segment
    pub doc_num: u64,
    /// Number of occurrences, equal to `positions.len()` when positions are kept
    pub frequency: u64,
    /// Strictly increasing 0-based token positions
    pub positions: Vec<u64>,
}

/// Per-field metadata recorded in the segment footer
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub dict_offset: u64,
    pub dict_size: u64,
    pub postings_offset: u64,
    pub postings_size: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub doc_count: u64,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Segment footer, serialized as JSON for forward extensibility
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Footer {
    #[serde(rename = "stored_offset")]
    pub stored_fields_offset: u64,
    #[serde(rename = "fields_offset")]
    pub fields_index_offset: u64,
    #[serde(rename = "chunks", default)]
    pub chunk_offsets: Vec<u64>,
    #[serde(rename = "fields", default)]
    pub fields_meta: Vec<FieldMeta>,
    #[serde(rename = "doc_ids", default)]
    pub doc_ids: Vec<String>,
    pub num_docs: u64,
    #[serde(rename = "field_lengths", default, skip_serializing_if = "HashMap::is_empty")]
    pub field_lengths: HashMap<String, Vec<u64>>,
}
