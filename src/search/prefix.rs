//! Prefix search
//!
//! Segments answer prefixes through bounded FST range iteration; the
//! builder is scanned directly. Expanded matches score with tf = 1.0 like
//! the other multi-term primitives.

use std::collections::{BTreeSet, HashSet};

use super::score::SearchMatch;
use super::{Hit, Searcher};
use crate::error::{Result, SkaldError};

impl Searcher<'_> {
    pub(crate) fn prefix_search(&self, prefix: &str, field: Option<&str>) -> Result<Vec<Hit>> {
        self.require_field(field)?;

        let fields = self.fields_to_search(field);
        let mut seen: HashSet<String> = HashSet::new();
        let mut matches = Vec::new();

        for snap in self.snapshot().segments().iter().rev() {
            for f in &fields {
                let postings =
                    match snap.segment().prefix_postings(prefix, f, snap.deleted_filter()) {
                        Ok(postings) => postings,
                        Err(SkaldError::FieldNotFound(_)) => continue,
                        Err(e) => return Err(e),
                    };

                for p in postings {
                    let Some(external_id) = snap.segment().external_id(p.doc_num) else {
                        continue;
                    };
                    if seen.contains(external_id) {
                        continue;
                    }
                    seen.insert(external_id.to_string());

                    matches.push(SearchMatch {
                        doc_id: external_id.to_string(),
                        tf: 1.0,
                        field_length: snap.segment().field_length(f, p.doc_num),
                        field: Some(f.clone()),
                    });
                }
            }
        }

        let builder = self.snapshot().builder().read();
        for f in &fields {
            let Some(field_terms) = builder.fields().get(f) else {
                continue;
            };

            let mut matched_docs: BTreeSet<u64> = BTreeSet::new();
            for (term, postings) in field_terms {
                if !term.starts_with(prefix) {
                    continue;
                }
                for p in postings {
                    if !builder.is_deleted(p.doc_num) {
                        matched_docs.insert(p.doc_num);
                    }
                }
            }

            for doc_num in matched_docs {
                let Some(external_id) = builder.doc_ids().get(doc_num as usize) else {
                    continue;
                };
                if seen.contains(external_id) {
                    continue;
                }
                seen.insert(external_id.clone());

                matches.push(SearchMatch {
                    doc_id: external_id.clone(),
                    tf: 1.0,
                    field_length: builder.field_length(f, doc_num),
                    field: Some(f.clone()),
                });
            }
        }
        drop(builder);

        Ok(self.score_and_sort(matches, field))
    }
}
