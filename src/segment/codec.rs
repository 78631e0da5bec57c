//! Wire codec for posting lists and stored-field chunks
//!
//! Posting lists are delta-coded with unsigned LEB128 varints:
//! `count; docnum_deltas[count]; frequencies[count];
//! { position_count; position_deltas[position_count] } per posting`.
//! Stored chunks are Snappy-compressed JSON arrays prefixed with a
//! big-endian u32 length.

use roaring::RoaringBitmap;

use super::types::Posting;
use crate::error::{Result, SkaldError};

/// Append an unsigned varint (LEB128) to the buffer
pub fn write_uvarint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Read an unsigned varint (LEB128), advancing `pos`
pub fn read_uvarint(data: &[u8], pos: &mut usize) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = *data
            .get(*pos)
            .ok_or_else(|| SkaldError::CorruptSegment("truncated varint".to_string()))?;
        *pos += 1;

        if shift >= 64 {
            return Err(SkaldError::CorruptSegment("varint overflow".to_string()));
        }
        result |= u64::from(byte & 0x7f) << shift;

        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Read a big-endian u64 at `offset`
pub fn read_u64_be(data: &[u8], offset: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[offset..offset + 8]);
    u64::from_be_bytes(buf)
}

/// Read a big-endian u32 at `offset`
pub fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[offset..offset + 4]);
    u32::from_be_bytes(buf)
}

/// Encode a posting list with delta coding
pub fn encode_postings(postings: &[Posting]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(postings.len() * 16 + 1);

    write_uvarint(&mut buf, postings.len() as u64);

    let mut prev_doc_num = 0u64;
    for p in postings {
        write_uvarint(&mut buf, p.doc_num - prev_doc_num);
        prev_doc_num = p.doc_num;
    }

    for p in postings {
        write_uvarint(&mut buf, p.frequency);
    }

    for p in postings {
        write_uvarint(&mut buf, p.positions.len() as u64);
        let mut prev_pos = 0u64;
        for &pos in &p.positions {
            write_uvarint(&mut buf, pos - prev_pos);
            prev_pos = pos;
        }
    }

    buf
}

/// Decode a posting list
pub fn decode_postings(data: &[u8]) -> Result<Vec<Posting>> {
    let mut pos = 0usize;
    let count = read_uvarint(data, &mut pos)? as usize;

    let mut postings = Vec::with_capacity(count);

    let mut prev_doc_num = 0u64;
    for _ in 0..count {
        let delta = read_uvarint(data, &mut pos)?;
        let doc_num = prev_doc_num + delta;
        prev_doc_num = doc_num;
        postings.push(Posting {
            doc_num,
            frequency: 0,
            positions: Vec::new(),
        });
    }

    for posting in postings.iter_mut() {
        posting.frequency = read_uvarint(data, &mut pos)?;
    }

    for posting in postings.iter_mut() {
        let pos_count = read_uvarint(data, &mut pos)? as usize;
        let mut positions = Vec::with_capacity(pos_count);
        let mut prev = 0u64;
        for _ in 0..pos_count {
            let delta = read_uvarint(data, &mut pos)?;
            let position = prev + delta;
            prev = position;
            positions.push(position);
        }
        posting.positions = positions;
    }

    Ok(postings)
}

/// Decode only the docnums of a posting list into a bitmap.
///
/// Reads the count and docnum deltas and skips frequencies and positions,
/// which makes it cheaper than `decode_postings` when only set membership
/// matters. Docnums present in `deleted` are filtered out.
pub fn decode_postings_bitmap(
    data: &[u8],
    deleted: Option<&RoaringBitmap>,
) -> Result<RoaringBitmap> {
    let mut pos = 0usize;
    let count = read_uvarint(data, &mut pos)?;

    let mut bm = RoaringBitmap::new();
    let mut prev_doc_num = 0u64;
    for _ in 0..count {
        let delta = read_uvarint(data, &mut pos)?;
        let doc_num = prev_doc_num + delta;
        prev_doc_num = doc_num;

        if deleted.map_or(true, |d| !d.contains(doc_num as u32)) {
            bm.insert(doc_num as u32);
        }
    }

    Ok(bm)
}

/// Compress a stored-fields chunk with Snappy (raw block format)
pub fn compress_chunk(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Encoder::new()
        .compress_vec(data)
        .map_err(|e| SkaldError::CorruptSegment(format!("snappy compression failed: {e}")))
}

/// Decompress a stored-fields chunk
pub fn decompress_chunk(data: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(data)
        .map_err(|e| SkaldError::CorruptSegment(format!("snappy decompression failed: {e}")))
}
