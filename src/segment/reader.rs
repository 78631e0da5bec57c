//! Immutable segment reader backed by a read-only mmap
//!
//! Opening validates the magic, version, and footer. Per-field FSTs are
//! loaded lazily on first access under a read-then-upgrade lock. All reader
//! methods are safe for concurrent readers; the mmap region is never
//! mutated.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fst::automaton::Levenshtein;
use fst::{Automaton, IntoStreamer, Map, Streamer};
use memmap2::{Mmap, MmapOptions};
use parking_lot::RwLock;
use regex_automata::dense;
use roaring::RoaringBitmap;

use super::codec::{decode_postings, decode_postings_bitmap, decompress_chunk, read_u32_be, read_u64_be};
use super::types::{
    decode_one_hit, is_one_hit, Document, FieldMeta, Footer, Posting, CHUNK_SIZE, ID_FIELD,
    SEGMENT_MAGIC, SEGMENT_VERSION,
};
use crate::error::{Result, SkaldError};

/// Header: magic + version + num_docs + two region offsets; trailer: footer
/// offset + size.
const HEADER_LEN: u64 = 4 + 4 + 8 + 16;
const TRAILER_LEN: u64 = 16;

/// A window into the segment mmap, used as FST backing storage without
/// copying the dictionary bytes out of the map.
#[derive(Clone)]
struct MmapSlice {
    data: Arc<Mmap>,
    start: usize,
    end: usize,
}

impl AsRef<[u8]> for MmapSlice {
    fn as_ref(&self) -> &[u8] {
        &self.data[self.start..self.end]
    }
}

/// An immutable, memory-mapped segment
#[derive(Debug)]
pub struct Segment {
    id: String,
    path: PathBuf,
    data: Arc<Mmap>,
    footer: Footer,
    field_meta_by_name: HashMap<String, usize>,
    fsts: RwLock<HashMap<String, Arc<Map<MmapSlice>>>>,
}

impl Segment {
    /// Open an existing segment file with mmap
    pub fn open(path: &Path, segment_id: &str) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < HEADER_LEN + TRAILER_LEN {
            return Err(SkaldError::CorruptSegment(format!(
                "segment file too small: {}",
                path.display()
            )));
        }

        let data = Arc::new(unsafe { MmapOptions::new().map(&file)? });

        if data[..4] != SEGMENT_MAGIC[..] {
            return Err(SkaldError::CorruptSegment(format!(
                "invalid segment magic: {}",
                path.display()
            )));
        }
        let version = read_u32_be(&data, 4);
        if version != SEGMENT_VERSION {
            return Err(SkaldError::CorruptSegment(format!(
                "unsupported segment version {version}: {}",
                path.display()
            )));
        }

        let len = data.len();
        let footer_offset = read_u64_be(&data, len - 16) as usize;
        let footer_size = read_u64_be(&data, len - 8) as usize;
        if footer_offset + footer_size > len - TRAILER_LEN as usize {
            return Err(SkaldError::CorruptSegment(format!(
                "footer out of bounds: {}",
                path.display()
            )));
        }

        let footer: Footer = serde_json::from_slice(&data[footer_offset..footer_offset + footer_size])
            .map_err(|e| SkaldError::CorruptSegment(format!("failed to parse footer: {e}")))?;

        let field_meta_by_name = footer
            .fields_meta
            .iter()
            .enumerate()
            .map(|(i, fm)| (fm.name.clone(), i))
            .collect();

        Ok(Self {
            id: segment_id.to_string(),
            path: path.to_path_buf(),
            data,
            footer,
            field_meta_by_name,
            fsts: RwLock::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total number of documents, including build-time deletions
    pub fn num_docs(&self) -> u64 {
        self.footer.num_docs
    }

    /// External id for a docnum, `None` if out of range
    pub fn external_id(&self, doc_num: u64) -> Option<&str> {
        self.footer.doc_ids.get(doc_num as usize).map(|s| s.as_str())
    }

    /// Indexed field names in footer order
    pub fn fields(&self) -> Vec<&str> {
        self.footer.fields_meta.iter().map(|fm| fm.name.as_str()).collect()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.field_meta_by_name.contains_key(field)
    }

    fn field_meta(&self, field: &str) -> Option<&FieldMeta> {
        self.field_meta_by_name
            .get(field)
            .map(|&i| &self.footer.fields_meta[i])
    }

    /// Look up the docnum for an external id via the `_id` dictionary.
    ///
    /// `_id` values are always one-hit encoded; anything else means the
    /// segment is corrupt.
    pub fn doc_num(&self, external_id: &str) -> Result<Option<u64>> {
        if !self.has_field(ID_FIELD) {
            return Ok(None);
        }
        let fst = self.field_fst(ID_FIELD)?;

        match fst.get(external_id.as_bytes()) {
            Some(value) if is_one_hit(value) => Ok(Some(decode_one_hit(value))),
            Some(_) => Err(SkaldError::CorruptSegment(format!(
                "non-one-hit _id entry for {external_id} in segment {}",
                self.id
            ))),
            None => Ok(None),
        }
    }

    /// Bitmap of docnums for the given external ids
    pub fn doc_numbers(&self, external_ids: &[&str]) -> Result<RoaringBitmap> {
        let mut bm = RoaringBitmap::new();
        for id in external_ids {
            if let Some(doc_num) = self.doc_num(id)? {
                bm.insert(doc_num as u32);
            }
        }
        Ok(bm)
    }

    /// Token count of a field value, 0 if absent
    pub fn field_length(&self, field: &str, doc_num: u64) -> u64 {
        self.footer
            .field_lengths
            .get(field)
            .and_then(|lengths| lengths.get(doc_num as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Average field length over documents counted at build time
    pub fn avg_field_length(&self, field: &str) -> f64 {
        match self.field_meta(field) {
            Some(meta) if meta.doc_count > 0 => meta.total_tokens as f64 / meta.doc_count as f64,
            _ => 0.0,
        }
    }

    /// Load the FST for a field, caching it for subsequent lookups
    fn field_fst(&self, field: &str) -> Result<Arc<Map<MmapSlice>>> {
        {
            let cache = self.fsts.read();
            if let Some(fst) = cache.get(field) {
                return Ok(fst.clone());
            }
        }

        let mut cache = self.fsts.write();
        if let Some(fst) = cache.get(field) {
            return Ok(fst.clone());
        }

        let meta = self
            .field_meta(field)
            .ok_or_else(|| SkaldError::FieldNotFound(field.to_string()))?;

        let dict_offset = meta.dict_offset as usize;
        let fst_len = read_u64_be(&self.data, dict_offset) as usize;
        let start = dict_offset + 8;
        let end = start + fst_len;
        if end > self.data.len() {
            return Err(SkaldError::CorruptSegment(format!(
                "dictionary for field {field} out of bounds in segment {}",
                self.id
            )));
        }

        let slice = MmapSlice {
            data: self.data.clone(),
            start,
            end,
        };
        let fst = Arc::new(Map::new(slice).map_err(|e| {
            SkaldError::CorruptSegment(format!("failed to load dictionary for field {field}: {e}"))
        })?);

        cache.insert(field.to_string(), fst.clone());
        Ok(fst)
    }

    fn postings_at(&self, field_meta: &FieldMeta, rel_offset: u64) -> &[u8] {
        &self.data[(field_meta.postings_offset + rel_offset) as usize..]
    }

    /// Materialize the single posting behind a one-hit FST value
    fn one_hit_posting(doc_num: u64) -> Posting {
        Posting {
            doc_num,
            frequency: 1,
            positions: vec![1],
        }
    }

    /// Full postings for a term in a field, minus deleted docnums
    pub fn search(
        &self,
        term: &str,
        field: &str,
        deleted: Option<&RoaringBitmap>,
    ) -> Result<Vec<Posting>> {
        let fst = self.field_fst(field)?;

        let Some(value) = fst.get(term.as_bytes()) else {
            return Ok(Vec::new());
        };

        if is_one_hit(value) {
            let doc_num = decode_one_hit(value);
            if deleted.is_some_and(|d| d.contains(doc_num as u32)) {
                return Ok(Vec::new());
            }
            return Ok(vec![Self::one_hit_posting(doc_num)]);
        }

        let meta = self
            .field_meta(field)
            .ok_or_else(|| SkaldError::FieldNotFound(field.to_string()))?;
        let postings = decode_postings(self.postings_at(meta, value))?;

        match deleted {
            Some(d) if !d.is_empty() => Ok(postings
                .into_iter()
                .filter(|p| !d.contains(p.doc_num as u32))
                .collect()),
            _ => Ok(postings),
        }
    }

    /// Bitmap of docnums containing a term, minus deleted docnums
    pub fn search_bitmap(
        &self,
        term: &str,
        field: &str,
        deleted: Option<&RoaringBitmap>,
    ) -> Result<RoaringBitmap> {
        let fst = self.field_fst(field)?;

        let Some(value) = fst.get(term.as_bytes()) else {
            return Ok(RoaringBitmap::new());
        };

        if is_one_hit(value) {
            let doc_num = decode_one_hit(value);
            let mut bm = RoaringBitmap::new();
            if !deleted.is_some_and(|d| d.contains(doc_num as u32)) {
                bm.insert(doc_num as u32);
            }
            return Ok(bm);
        }

        let meta = self
            .field_meta(field)
            .ok_or_else(|| SkaldError::FieldNotFound(field.to_string()))?;
        decode_postings_bitmap(self.postings_at(meta, value), deleted)
    }

    /// Union of postings for all terms starting with `prefix`.
    ///
    /// Frequencies are summed per docnum; positions are dropped because
    /// prefix matches are never combined with phrase adjacency.
    pub fn prefix_postings(
        &self,
        prefix: &str,
        field: &str,
        deleted: Option<&RoaringBitmap>,
    ) -> Result<Vec<Posting>> {
        let fst = self.field_fst(field)?;
        let meta = self
            .field_meta(field)
            .ok_or_else(|| SkaldError::FieldNotFound(field.to_string()))?;

        let successor = prefix_successor(prefix.as_bytes());
        let mut range = fst.range().ge(prefix.as_bytes());
        if let Some(succ) = &successor {
            range = range.lt(succ);
        }

        let mut doc_frequencies: HashMap<u64, u64> = HashMap::new();
        let mut stream = range.into_stream();
        while let Some((_, value)) = stream.next() {
            if is_one_hit(value) {
                let doc_num = decode_one_hit(value);
                if !deleted.is_some_and(|d| d.contains(doc_num as u32)) {
                    *doc_frequencies.entry(doc_num).or_insert(0) += 1;
                }
                continue;
            }

            for p in decode_postings(self.postings_at(meta, value))? {
                if deleted.is_some_and(|d| d.contains(p.doc_num as u32)) {
                    continue;
                }
                *doc_frequencies.entry(p.doc_num).or_insert(0) += p.frequency;
            }
        }

        let mut result: Vec<Posting> = doc_frequencies
            .into_iter()
            .map(|(doc_num, frequency)| Posting {
                doc_num,
                frequency,
                positions: Vec::new(),
            })
            .collect();
        result.sort_by_key(|p| p.doc_num);

        Ok(result)
    }

    fn terms_matching_automaton<A: Automaton>(&self, field: &str, aut: A) -> Result<Vec<String>> {
        let fst = self.field_fst(field)?;

        let mut terms = Vec::new();
        let mut stream = fst.search(aut).into_stream();
        while let Some((key, _)) = stream.next() {
            if let Ok(term) = std::str::from_utf8(key) {
                terms.push(term.to_string());
            }
        }

        Ok(terms)
    }

    /// All terms in a field matched by a regular expression.
    ///
    /// The pattern is compiled to a DFA and must match the entire term.
    pub fn matching_terms(&self, pattern: &str, field: &str) -> Result<Vec<String>> {
        let dfa = dense::Builder::new()
            .anchored(true)
            .build(pattern)
            .map_err(|e| SkaldError::InvalidQuery(format!("invalid regex pattern: {e}")))?;
        self.terms_matching_automaton(field, &dfa)
    }

    /// All terms in a field within the given edit distance of `term`.
    ///
    /// Uses a Levenshtein automaton; transpositions count as two edits.
    pub fn fuzzy_terms(&self, term: &str, fuzziness: u32, field: &str) -> Result<Vec<String>> {
        let aut = Levenshtein::new(term, fuzziness)
            .map_err(|e| SkaldError::InvalidQuery(format!("invalid fuzzy term: {e}")))?;
        self.terms_matching_automaton(field, aut)
    }

    /// Load a stored document by docnum
    pub fn load_doc(&self, doc_num: u64) -> Result<Document> {
        if doc_num >= self.footer.num_docs {
            return Err(SkaldError::NotFound(format!(
                "docnum {doc_num} out of range in segment {}",
                self.id
            )));
        }

        let chunk_idx = (doc_num / CHUNK_SIZE) as usize;
        let offset = *self
            .footer
            .chunk_offsets
            .get(chunk_idx)
            .ok_or_else(|| SkaldError::CorruptSegment("chunk index out of range".to_string()))?
            as usize;

        let chunk_len = read_u32_be(&self.data, offset) as usize;
        let compressed = &self.data[offset + 4..offset + 4 + chunk_len];
        let decompressed = decompress_chunk(compressed)?;

        let mut chunk: Vec<Document> = serde_json::from_slice(&decompressed)
            .map_err(|e| SkaldError::CorruptSegment(format!("failed to parse chunk: {e}")))?;

        let doc_in_chunk = (doc_num % CHUNK_SIZE) as usize;
        if doc_in_chunk >= chunk.len() {
            return Err(SkaldError::CorruptSegment(
                "document index out of range in chunk".to_string(),
            ));
        }

        Ok(chunk.swap_remove(doc_in_chunk))
    }
}

/// Lexicographically next byte string after all strings with this prefix.
/// `None` means the range is open-ended.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut succ = prefix.to_vec();

    while let Some(&last) = succ.last() {
        if last < 0xff {
            let idx = succ.len() - 1;
            succ[idx] += 1;
            return Some(succ);
        }
        succ.pop();
    }

    None
}
