//! Segment merging: physical removal of tombstoned documents
//!
//! Merging re-reads the stored documents of the chosen segments, skipping
//! deleted docnums, and feeds them through a fresh builder. Re-tokenizing
//! from stored fields is sound because analyzers are deterministic.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{Result, SkaldError};
use crate::segment::{Builder, Segment};

use super::Index;

impl Index {
    /// Merge all segments into one. A no-op with fewer than two segments.
    pub fn force_merge(&self) -> Result<()> {
        let segment_ids: Vec<String> = {
            let state = self.state.read();
            state.segments.iter().map(|s| s.id().to_string()).collect()
        };

        if segment_ids.len() < 2 {
            return Ok(());
        }

        self.merge(&segment_ids)
    }

    /// Merge a chosen set of at least two segments into a new one
    pub fn merge(&self, segment_ids: &[String]) -> Result<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(SkaldError::ClosedIndex);
        }

        if segment_ids.len() < 2 {
            return Err(SkaldError::InvalidArgument(
                "need at least 2 segments to merge".to_string(),
            ));
        }

        let id_set: HashSet<&str> = segment_ids.iter().map(|s| s.as_str()).collect();

        let mut to_merge = Vec::with_capacity(segment_ids.len());
        for seg in &state.segments {
            if id_set.contains(seg.id()) {
                let mut deleted = self.meta.deletions(seg.id())?;
                if let Some(pending) = state.pending_deletions.get(seg.id()) {
                    deleted |= pending;
                }
                to_merge.push((seg.clone(), deleted));
            }
        }

        if to_merge.len() != segment_ids.len() {
            return Err(SkaldError::NotFound("some segments not found".to_string()));
        }

        let mut builder = Builder::new(self.analyzer.clone());

        for (seg, deleted) in &to_merge {
            for doc_num in 0..seg.num_docs() {
                if deleted.contains(doc_num as u32) {
                    continue;
                }
                let Ok(doc) = seg.load_doc(doc_num) else {
                    tracing::warn!(segment = %seg.id(), doc_num, "skipping unreadable document during merge");
                    continue;
                };
                let Some(external_id) = seg.external_id(doc_num) else {
                    continue;
                };
                builder.add(external_id, doc);
            }
        }

        let current_epoch = self.meta.epoch()?;
        let new_segment_id = format!("{:012}", current_epoch + 1);

        let seg_path = builder.build(&self.dir, &new_segment_id)?;
        let new_seg = match Segment::open(&seg_path, &new_segment_id) {
            Ok(seg) => seg,
            Err(e) => {
                let _ = std::fs::remove_file(&seg_path);
                return Err(e);
            }
        };

        let mut surviving: Vec<Arc<Segment>> = state
            .segments
            .iter()
            .filter(|seg| !id_set.contains(seg.id()))
            .cloned()
            .collect();
        surviving.push(Arc::new(new_seg));

        let tx_result = self.meta.update(|tx| {
            let epoch = tx.increment_epoch()?;

            for (doc_num, external_id) in builder.doc_ids().iter().enumerate() {
                tx.set_doc_mapping(external_id, &new_segment_id, doc_num as u64)?;
            }

            for segment_id in segment_ids {
                tx.delete_deletions(segment_id);
            }

            let segment_list: Vec<String> =
                surviving.iter().map(|seg| seg.id().to_string()).collect();
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

        tracing::info!(
            merged = segment_ids.len(),
            segment = %new_segment_id,
            docs = builder.total_docs(),
            epoch,
            "merged segments"
        );

        let removed_paths: Vec<std::path::PathBuf> = to_merge
            .iter()
            .map(|(seg, _)| seg.path().to_path_buf())
            .collect();

        state.segments = surviving;
        state.epoch = epoch;
        for segment_id in segment_ids {
            state.pending_deletions.remove(segment_id);
        }
        drop(to_merge);

        for path in removed_paths {
            let _ = std::fs::remove_file(path);
        }

        Ok(())
    }
}
