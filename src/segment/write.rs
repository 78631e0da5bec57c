//! Serializing a builder into an immutable segment file
//!
//! Layout: header, 16-byte offset placeholder, stored-fields chunks, the
//! per-field postings + FST index, then the JSON footer and its 16-byte
//! trailer. The file is written to a `.seg.tmp` path and renamed into place;
//! the rename is the atomic publish point.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fst::MapBuilder;

use super::builder::Builder;
use super::codec::{compress_chunk, encode_postings};
use super::types::{encode_one_hit, FieldMeta, Footer, CHUNK_SIZE, SEGMENT_MAGIC, SEGMENT_VERSION};
use crate::error::{Result, SkaldError};

impl Builder {
    /// Write the segment to `dir` and return its final path
    pub fn build(&self, dir: &Path, segment_id: &str) -> Result<PathBuf> {
        let seg_path = dir.join(format!("{segment_id}.seg"));
        let tmp_path = dir.join(format!("{segment_id}.seg.tmp"));

        if let Err(e) = self.write_segment_file(&tmp_path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }

        std::fs::rename(&tmp_path, &seg_path)?;
        Ok(seg_path)
    }

    fn write_segment_file(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)?;

        file.write_all(SEGMENT_MAGIC)?;
        file.write_all(&SEGMENT_VERSION.to_be_bytes())?;
        file.write_all(&self.total_docs().to_be_bytes())?;

        // Patched with the real offsets once the regions are written.
        let offsets_pos = file.stream_position()?;
        file.write_all(&[0u8; 16])?;

        let stored_fields_offset = file.stream_position()?;
        let chunk_offsets = self.write_stored_fields(&mut file)?;

        let fields_index_offset = file.stream_position()?;
        let mut fields_meta = self.write_fields_index(&mut file)?;

        for meta in fields_meta.iter_mut() {
            if let Some(lengths) = self.field_lengths().get(&meta.name) {
                let mut total = 0u64;
                let mut count = 0u64;
                for (doc_num, &len) in lengths.iter().enumerate() {
                    if len > 0 && !self.is_deleted(doc_num as u64) {
                        total += len;
                        count += 1;
                    }
                }
                meta.total_tokens = total;
                meta.doc_count = count;
            }
        }

        let footer_offset = file.stream_position()?;
        let footer = Footer {
            stored_fields_offset,
            fields_index_offset,
            chunk_offsets,
            fields_meta,
            doc_ids: self.doc_ids().to_vec(),
            num_docs: self.total_docs(),
            field_lengths: self.field_lengths().clone(),
        };
        let footer_data = serde_json::to_vec(&footer)?;
        file.write_all(&footer_data)?;

        file.write_all(&footer_offset.to_be_bytes())?;
        file.write_all(&(footer_data.len() as u64).to_be_bytes())?;

        file.seek(SeekFrom::Start(offsets_pos))?;
        file.write_all(&stored_fields_offset.to_be_bytes())?;
        file.write_all(&fields_index_offset.to_be_bytes())?;

        file.sync_all()?;
        Ok(())
    }

    /// Write chunked, Snappy-compressed stored documents
    fn write_stored_fields(&self, file: &mut File) -> Result<Vec<u64>> {
        let mut chunk_offsets = Vec::new();

        for chunk in self.docs().chunks(CHUNK_SIZE as usize) {
            let chunk_data = serde_json::to_vec(chunk)?;
            let compressed = compress_chunk(&chunk_data)?;

            chunk_offsets.push(file.stream_position()?);

            file.write_all(&(compressed.len() as u32).to_be_bytes())?;
            file.write_all(&compressed)?;
        }

        Ok(chunk_offsets)
    }

    /// Write the postings region and FST dictionary for every field,
    /// in ascending field name order
    fn write_fields_index(&self, file: &mut File) -> Result<Vec<FieldMeta>> {
        let mut field_names: Vec<&String> = self.fields().keys().collect();
        field_names.sort();

        let mut fields_meta = Vec::with_capacity(field_names.len());
        for name in field_names {
            fields_meta.push(self.write_field_index(file, name)?);
        }

        Ok(fields_meta)
    }

    fn write_field_index(&self, file: &mut File, field_name: &str) -> Result<FieldMeta> {
        let mut meta = FieldMeta {
            name: field_name.to_string(),
            ..Default::default()
        };

        let terms = &self.fields()[field_name];
        let mut term_list: Vec<&String> = terms.keys().collect();
        term_list.sort();

        meta.postings_offset = file.stream_position()?;

        // Single-occurrence terms are inlined into the FST value instead of
        // the postings region.
        let mut term_values = Vec::with_capacity(term_list.len());
        for term in &term_list {
            let postings = &terms[term.as_str()];
            debug_assert!(postings.windows(2).all(|w| w[0].doc_num < w[1].doc_num));

            if postings.len() == 1
                && postings[0].frequency == 1
                && postings[0].positions.len() == 1
            {
                term_values.push(encode_one_hit(postings[0].doc_num));
                continue;
            }

            let rel_offset = file.stream_position()? - meta.postings_offset;
            term_values.push(rel_offset);
            file.write_all(&encode_postings(postings))?;
        }

        meta.postings_size = file.stream_position()? - meta.postings_offset;

        meta.dict_offset = file.stream_position()?;

        let mut fst_builder = MapBuilder::memory();
        for (term, value) in term_list.iter().zip(&term_values) {
            fst_builder
                .insert(term.as_bytes(), *value)
                .map_err(SkaldError::Fst)?;
        }
        let fst_data = fst_builder.into_inner().map_err(SkaldError::Fst)?;

        file.write_all(&(fst_data.len() as u64).to_be_bytes())?;
        file.write_all(&fst_data)?;

        meta.dict_size = file.stream_position()? - meta.dict_offset;

        Ok(meta)
    }
}
