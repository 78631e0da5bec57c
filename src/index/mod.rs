//! Index coordinator: the single writer over builder, segments, and metadata
//!
//! One read-write lock guards the mutable state. Write operations (index,
//! delete, flush, merge) take it in write mode; readers only take it long
//! enough to produce an [`IndexSnapshot`] and then run lock-free against
//! the snapshot.

mod merge;
mod ops;
mod snapshot;

pub use ops::{PostingEntry, SegmentInfo, SegmentStats};
pub use snapshot::{IndexSnapshot, SegmentSnapshot};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::analysis::{Analyzer, SimpleAnalyzer};
use crate::config::{IndexConfig, ScoringMode};
use crate::error::{Result, SkaldError};
use crate::segment::{Builder, Document, Segment, ID_FIELD};
use crate::store::MetadataStore;

pub(crate) struct IndexState {
    pub(crate) segments: Vec<Arc<Segment>>,
    pub(crate) builder: Arc<RwLock<Builder>>,
    pub(crate) pending_deletions: HashMap<String, RoaringBitmap>,
    pub(crate) epoch: u64,
    pub(crate) closed: bool,
}

/// A single-writer, multi-reader full-text index over one directory
pub struct Index {
    pub(crate) dir: PathBuf,
    pub(crate) meta: MetadataStore,
    pub(crate) analyzer: Arc<dyn Analyzer>,
    pub(crate) flush_threshold: usize,
    pub(crate) scoring: ScoringMode,
    pub(crate) state: RwLock<IndexState>,
}

impl Index {
    /// Create or open an index with the default analyzer
    pub fn open(config: IndexConfig) -> Result<Self> {
        Self::open_with_analyzer(config, Arc::new(SimpleAnalyzer::new()))
    }

    /// Create or open an index with a caller-supplied analyzer.
    ///
    /// The analyzer must match the one used when the directory was written;
    /// terms are compared byte-for-byte.
    pub fn open_with_analyzer(config: IndexConfig, analyzer: Arc<dyn Analyzer>) -> Result<Self> {
        std::fs::create_dir_all(&config.dir)?;

        let meta = MetadataStore::open(&config.dir)?;

        let mut segments = Vec::new();
        for segment_id in meta.segments()? {
            let path = config.dir.join(format!("{segment_id}.seg"));
            let seg = Segment::open(&path, &segment_id)?;
            segments.push(Arc::new(seg));
        }
        let epoch = meta.epoch()?;

        tracing::debug!(
            dir = %config.dir.display(),
            segments = segments.len(),
            epoch,
            "opened index"
        );

        Ok(Self {
            dir: config.dir,
            meta,
            analyzer: analyzer.clone(),
            flush_threshold: config.flush_threshold,
            scoring: config.scoring,
            state: RwLock::new(IndexState {
                segments,
                builder: Arc::new(RwLock::new(Builder::new(analyzer))),
                pending_deletions: HashMap::new(),
                epoch,
                closed: false,
            }),
        })
    }

    /// Index a document under an external id.
    ///
    /// Any earlier copy of the id is masked: deleted from the builder and
    /// tombstoned in every persisted segment before the new copy is added.
    /// Crossing the flush threshold triggers an automatic flush.
    pub fn index(&self, external_id: &str, doc: Document) -> Result<()> {
        if external_id.is_empty() {
            return Err(SkaldError::InvalidArgument(
                "external id must not be empty".to_string(),
            ));
        }
        if doc.contains_key(ID_FIELD) {
            return Err(SkaldError::InvalidArgument(format!(
                "field name {ID_FIELD} is reserved"
            )));
        }

        let mut state = self.state.write();
        if state.closed {
            return Err(SkaldError::ClosedIndex);
        }

        state.builder.write().delete(external_id);
        Self::mark_obsoletes(&mut state, &[external_id])?;
        state.builder.write().add(external_id, doc);

        if state.builder.read().num_docs() >= self.flush_threshold as u64 {
            self.flush_locked(&mut state)?;
        }

        Ok(())
    }

    /// Logically delete a document wherever it currently lives
    pub fn delete(&self, external_id: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SkaldError::ClosedIndex);
        }

        state.builder.write().delete(external_id);
        Self::mark_obsoletes(&mut state, &[external_id])
    }

    /// Tombstone every persisted copy of the given external ids by adding
    /// their docnums to the per-segment pending deletion bitmaps
    fn mark_obsoletes(state: &mut IndexState, external_ids: &[&str]) -> Result<()> {
        for seg in &state.segments {
            let obsoletes = seg.doc_numbers(external_ids)?;
            if obsoletes.is_empty() {
                continue;
            }
            *state
                .pending_deletions
                .entry(seg.id().to_string())
                .or_default() |= obsoletes;
        }
        Ok(())
    }

    /// Close the index. Open snapshots stay readable until dropped; every
    /// other operation fails with `ClosedIndex` afterwards.
    pub fn close(&self) {
        let mut state = self.state.write();
        if state.closed {
            return;
        }
        state.closed = true;
        state.segments.clear();
        state.pending_deletions.clear();
    }
}
