//! Point-in-time views of the index for searching
//!
//! A snapshot captures the open segments, a stable clone of each segment's
//! deletion bitmap (persisted tombstones plus pending ones), and a handle to
//! the live builder. Writers that run after the snapshot is taken do not
//! change the captured segment set or bitmaps.

use std::sync::Arc;

use parking_lot::RwLock;
use roaring::RoaringBitmap;

use crate::analysis::Analyzer;
use crate::config::ScoringMode;
use crate::error::Result;
use crate::segment::{Builder, Posting, Segment};

/// One segment plus the deletion bitmap in effect when the snapshot was taken
pub struct SegmentSnapshot {
    seg: Arc<Segment>,
    deleted: RoaringBitmap,
}

impl SegmentSnapshot {
    pub(crate) fn new(seg: Arc<Segment>, deleted: RoaringBitmap) -> Self {
        Self { seg, deleted }
    }

    pub fn segment(&self) -> &Segment {
        &self.seg
    }

    pub fn id(&self) -> &str {
        self.seg.id()
    }

    pub fn deleted(&self) -> &RoaringBitmap {
        &self.deleted
    }

    /// Deletion bitmap as an optional filter argument for segment reads
    pub fn deleted_filter(&self) -> Option<&RoaringBitmap> {
        if self.deleted.is_empty() {
            None
        } else {
            Some(&self.deleted)
        }
    }

    /// Term postings in this segment minus its deleted documents
    pub fn search(&self, term: &str, field: &str) -> Result<Vec<Posting>> {
        self.seg.search(term, field, self.deleted_filter())
    }

    /// Live document count
    pub fn num_live_docs(&self) -> u64 {
        self.seg.num_docs() - self.deleted.len()
    }
}

/// Immutable view of the whole index at one epoch
pub struct IndexSnapshot {
    segments: Vec<SegmentSnapshot>,
    builder: Arc<RwLock<Builder>>,
    epoch: u64,
    analyzer: Arc<dyn Analyzer>,
    scoring: ScoringMode,
}

impl IndexSnapshot {
    pub(crate) fn new(
        segments: Vec<SegmentSnapshot>,
        builder: Arc<RwLock<Builder>>,
        epoch: u64,
        analyzer: Arc<dyn Analyzer>,
        scoring: ScoringMode,
    ) -> Self {
        Self {
            segments,
            builder,
            epoch,
            analyzer,
            scoring,
        }
    }

    /// Segment snapshots in commit order (oldest first)
    pub fn segments(&self) -> &[SegmentSnapshot] {
        &self.segments
    }

    /// The live builder at snapshot time. Readers must only call its
    /// read-side accessors.
    pub fn builder(&self) -> &Arc<RwLock<Builder>> {
        &self.builder
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    pub fn scoring(&self) -> ScoringMode {
        self.scoring
    }

    /// Total live documents across segments and the builder
    pub fn total_docs(&self) -> u64 {
        let mut total: u64 = self.segments.iter().map(|s| s.num_live_docs()).sum();
        total += self.builder.read().num_docs();
        total
    }

    /// Average field length across segments and the builder, weighted by
    /// live document counts
    pub fn avg_field_length(&self, field: &str) -> f64 {
        let mut total_tokens = 0f64;
        let mut doc_count = 0u64;

        for snap in &self.segments {
            let avg = snap.segment().avg_field_length(field);
            if avg > 0.0 {
                let live = snap.num_live_docs();
                total_tokens += avg * live as f64;
                doc_count += live;
            }
        }

        {
            let builder = self.builder.read();
            let avg = builder.avg_field_length(field);
            if avg > 0.0 {
                let live = builder.num_docs();
                total_tokens += avg * live as f64;
                doc_count += live;
            }
        }

        if doc_count == 0 {
            0.0
        } else {
            total_tokens / doc_count as f64
        }
    }
}
