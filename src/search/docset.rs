//! Per-segment bitmap sets used by the boolean planner
//!
//! A `DocSet` holds one bitmap per open segment plus one for the builder,
//! all in local docnum space. Set algebra runs per slot; materialization
//! resolves bits to external ids newest-first so re-indexed documents
//! surface only once.

use std::collections::HashSet;

use roaring::RoaringBitmap;

use super::score::SearchMatch;
use super::{Hit, Searcher};

pub(crate) struct DocSet {
    /// One bitmap per snapshot segment, in snapshot order
    pub(crate) segment_docs: Vec<RoaringBitmap>,
    /// Matching docnums in the live builder
    pub(crate) builder_docs: RoaringBitmap,
}

impl DocSet {
    pub(crate) fn new(num_segments: usize) -> Self {
        Self {
            segment_docs: vec![RoaringBitmap::new(); num_segments],
            builder_docs: RoaringBitmap::new(),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.builder_docs.is_empty() && self.segment_docs.iter().all(|bm| bm.is_empty())
    }

    pub(crate) fn count(&self) -> u64 {
        self.builder_docs.len() + self.segment_docs.iter().map(|bm| bm.len()).sum::<u64>()
    }

    pub(crate) fn intersect(&self, other: &DocSet) -> DocSet {
        DocSet {
            segment_docs: self
                .segment_docs
                .iter()
                .zip(&other.segment_docs)
                .map(|(a, b)| a & b)
                .collect(),
            builder_docs: &self.builder_docs & &other.builder_docs,
        }
    }

    pub(crate) fn subtract(&self, other: &DocSet) -> DocSet {
        DocSet {
            segment_docs: self
                .segment_docs
                .iter()
                .zip(&other.segment_docs)
                .map(|(a, b)| a - b)
                .collect(),
            builder_docs: &self.builder_docs - &other.builder_docs,
        }
    }
}

/// Multiway union
pub(crate) fn union_all(sets: Vec<DocSet>) -> Option<DocSet> {
    let mut iter = sets.into_iter();
    let mut result = iter.next()?;
    for ds in iter {
        for (acc, bm) in result.segment_docs.iter_mut().zip(ds.segment_docs) {
            *acc |= bm;
        }
        result.builder_docs |= ds.builder_docs;
    }
    Some(result)
}

/// Multiway intersection, smallest set first for early termination
pub(crate) fn intersect_all(mut sets: Vec<DocSet>) -> Option<DocSet> {
    sets.sort_by_key(|ds| ds.count());

    let mut iter = sets.into_iter();
    let mut result = iter.next()?;
    for ds in iter {
        result = result.intersect(&ds);
        if result.is_empty() {
            return Some(result);
        }
    }
    Some(result)
}

impl Searcher<'_> {
    /// Resolve a final `DocSet` to scored hits.
    ///
    /// Segments are walked newest-first and the builder last; an external id
    /// already seen is skipped, so the newest surviving copy wins. DocSet
    /// results are scored with tf = 1.0.
    pub(crate) fn materialize(&self, ds: &DocSet, field: Option<&str>) -> Vec<Hit> {
        if ds.is_empty() {
            return Vec::new();
        }

        let segments = self.snapshot().segments();
        let mut seen: HashSet<String> = HashSet::new();
        let mut matches = Vec::new();

        for i in (0..segments.len()).rev() {
            let snap = &segments[i];
            for doc_num in ds.segment_docs[i].iter() {
                let doc_num = doc_num as u64;
                let Some(external_id) = snap.segment().external_id(doc_num) else {
                    continue;
                };
                if seen.contains(external_id) {
                    continue;
                }
                seen.insert(external_id.to_string());

                let field_length = field
                    .map(|f| snap.segment().field_length(f, doc_num))
                    .unwrap_or(0);
                matches.push(SearchMatch {
                    doc_id: external_id.to_string(),
                    tf: 1.0,
                    field_length,
                    field: field.map(String::from),
                });
            }
        }

        let builder = self.snapshot().builder().read();
        for doc_num in ds.builder_docs.iter() {
            let doc_num = doc_num as u64;
            if builder.is_deleted(doc_num) {
                continue;
            }
            let Some(external_id) = builder.doc_ids().get(doc_num as usize) else {
                continue;
            };
            if seen.contains(external_id) {
                continue;
            }
            seen.insert(external_id.clone());

            let field_length = field
                .map(|f| builder.field_length(f, doc_num))
                .unwrap_or(0);
            matches.push(SearchMatch {
                doc_id: external_id.clone(),
                tf: 1.0,
                field_length,
                field: field.map(String::from),
            });
        }
        drop(builder);

        self.score_and_sort(matches, field)
    }
}
