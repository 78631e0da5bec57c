//! Segmented inverted index: on-disk format, builder, and reader
//!
//! A segment is an immutable unit covering one batch of documents:
//!
//! - header (`ZAP\0`, version, doc count) and region offsets
//! - stored fields: Snappy-compressed JSON chunks of 1024 documents
//! - fields index: per field, a postings region followed by an FST term
//!   dictionary whose values are postings offsets or inline one-hit docnums
//! - JSON footer plus a 16-byte offset/size trailer
//!
//! `Builder` accumulates documents in memory; `Builder::build` serializes
//! them atomically (temp file + rename); `Segment` reads the result through
//! a shared read-only mmap.

mod builder;
mod codec;
mod reader;
mod types;
mod write;

pub use builder::Builder;
pub use codec::{
    decode_postings, decode_postings_bitmap, encode_postings, read_uvarint, write_uvarint,
};
pub use reader::{prefix_successor, Segment};
pub use types::{
    decode_one_hit, encode_one_hit, is_one_hit, Document, FieldMeta, Footer, Posting, CHUNK_SIZE,
    ID_FIELD, ONE_HIT_FLAG, SEGMENT_MAGIC, SEGMENT_VERSION,
};
