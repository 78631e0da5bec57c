//! Flush, snapshot, and inspection operations on the index

use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use super::snapshot::{IndexSnapshot, SegmentSnapshot};
use super::{Index, IndexState};
use crate::error::{Result, SkaldError};
use crate::segment::{Builder, Document, Segment};
use crate::store::DocMapping;

/// Summary of one open segment
#[derive(Clone, Debug)]
pub struct SegmentInfo {
    pub id: String,
    pub path: std::path::PathBuf,
    pub num_docs: u64,
}

/// Detailed per-segment statistics
#[derive(Clone, Debug)]
pub struct SegmentStats {
    pub num_docs: u64,
    pub num_deleted: u64,
    pub fields: Vec<String>,
}

/// One raw posting, exposed for debugging and verification tooling
#[derive(Clone, Debug)]
pub struct PostingEntry {
    pub segment_id: String,
    pub doc_num: u64,
    pub frequency: u64,
    pub positions: Vec<u64>,
}

impl Index {
    /// Flush the builder into a new immutable segment
    pub fn flush(&self) -> Result<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SkaldError::ClosedIndex);
        }
        self.flush_locked(&mut state)
    }

    /// Flush path shared by `flush` and the threshold check in `index`.
    /// Caller holds the write lock.
    pub(crate) fn flush_locked(&self, state: &mut IndexState) -> Result<()> {
        let builder = state.builder.clone();
        let builder = builder.read();
        if builder.num_docs() == 0 {
            return Ok(());
        }

        let current_segments = self.meta.segments()?;
        let current_epoch = self.meta.epoch()?;
        let segment_id = format!("{:012}", current_epoch + 1);

        // The segment file is written outside the metadata transaction and
        // removed again if the transaction does not commit.
        let seg_path = builder.build(&self.dir, &segment_id)?;

        let tx_result = self.meta.update(|tx| {
            let epoch = tx.increment_epoch()?;

            for (sid, pending) in &state.pending_deletions {
                if pending.is_empty() {
                    continue;
                }
                let mut existing = tx.deletions(sid)?;
                existing |= pending;
                tx.set_deletions(sid, &existing)?;
            }

            if !builder.deleted().is_empty() {
                tx.set_deletions(&segment_id, builder.deleted())?;
            }

            let mut segment_list = current_segments.clone();
            segment_list.push(segment_id.clone());
            tx.set_segments(&segment_list)?;

            Ok(epoch)
        });

        let epoch = match tx_result {
            Ok(epoch) => epoch,
            Err(e) => {
                let _ = std::fs::remove_file(&seg_path);
                return Err(e);
            }
        };

        let seg = Segment::open(&seg_path, &segment_id)?;

        tracing::info!(
            segment = %segment_id,
            docs = builder.total_docs(),
            epoch,
            "flushed segment"
        );

        drop(builder);
        state.segments.push(Arc::new(seg));
        state.epoch = epoch;
        state.pending_deletions.clear();
        state.builder = Arc::new(RwLock::new(Builder::new(self.analyzer.clone())));

        Ok(())
    }

    /// Deletion bitmap for a segment: persisted tombstones plus pending ones.
    /// Caller holds the lock.
    fn deletions_locked(&self, state: &IndexState, segment_id: &str) -> Result<RoaringBitmap> {
        let mut deleted = self.meta.deletions(segment_id)?;
        if let Some(pending) = state.pending_deletions.get(segment_id) {
            deleted |= pending;
        }
        Ok(deleted)
    }

    /// Capture a point-in-time snapshot for searching
    pub fn snapshot(&self) -> Result<IndexSnapshot> {
        let state = self.state.read();
        if state.closed {
            return Err(SkaldError::ClosedIndex);
        }

        let mut segments = Vec::with_capacity(state.segments.len());
        for seg in &state.segments {
            let deleted = self.deletions_locked(&state, seg.id())?;
            segments.push(SegmentSnapshot::new(seg.clone(), deleted));
        }

        Ok(IndexSnapshot::new(
            segments,
            state.builder.clone(),
            state.epoch,
            self.analyzer.clone(),
            self.scoring,
        ))
    }

    pub fn num_segments(&self) -> usize {
        self.state.read().segments.len()
    }

    /// Info for all open segments in commit order
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.state
            .read()
            .segments
            .iter()
            .map(|seg| SegmentInfo {
                id: seg.id().to_string(),
                path: seg.path().to_path_buf(),
                num_docs: seg.num_docs(),
            })
            .collect()
    }

    /// Detailed stats for one segment
    pub fn segment_stats(&self, segment_id: &str) -> Result<SegmentStats> {
        let state = self.state.read();

        for seg in &state.segments {
            if seg.id() == segment_id {
                let deleted = self.deletions_locked(&state, segment_id)?;
                return Ok(SegmentStats {
                    num_docs: seg.num_docs(),
                    num_deleted: deleted.len(),
                    fields: seg.fields().iter().map(|f| f.to_string()).collect(),
                });
            }
        }

        Err(SkaldError::NotFound(format!("segment {segment_id}")))
    }

    /// Load a stored document from a specific segment
    pub fn load_doc(&self, segment_id: &str, doc_num: u64) -> Result<Document> {
        let state = self.state.read();

        for seg in &state.segments {
            if seg.id() == segment_id {
                return seg.load_doc(doc_num);
            }
        }

        Err(SkaldError::NotFound(format!("segment {segment_id}")))
    }

    /// Raw postings for a `(field, term)` pair across all segments,
    /// ignoring deletions. Debugging aid.
    pub fn dump_postings(&self, field: &str, term: &str) -> Result<Vec<PostingEntry>> {
        let state = self.state.read();

        let mut entries = Vec::new();
        for seg in &state.segments {
            let postings = match seg.search(term, field, None) {
                Ok(postings) => postings,
                Err(SkaldError::FieldNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for p in postings {
                entries.push(PostingEntry {
                    segment_id: seg.id().to_string(),
                    doc_num: p.doc_num,
                    frequency: p.frequency,
                    positions: p.positions,
                });
            }
        }
        Ok(entries)
    }

    /// Deleted docnums for a segment, including pending tombstones
    pub fn dump_deletions(&self, segment_id: &str) -> Result<Vec<u32>> {
        let state = self.state.read();
        let deleted = self.deletions_locked(&state, segment_id)?;
        Ok(deleted.iter().collect())
    }

    /// Where an external id lives after a merge, if recorded
    pub fn doc_mapping(&self, external_id: &str) -> Result<Option<DocMapping>> {
        self.meta.doc_mapping(external_id)
    }
}
