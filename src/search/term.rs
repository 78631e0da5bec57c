//! Exact-term search over segments and the live builder

use std::collections::HashSet;

use super::docset::{union_all, DocSet};
use super::score::SearchMatch;
use super::{Hit, Searcher};
use crate::error::{Result, SkaldError};
use crate::segment::Builder;

impl Searcher<'_> {
    /// Search a term with real term frequencies, newest segments first
    pub(crate) fn term_search(&self, term: &str, field: Option<&str>) -> Result<Vec<Hit>> {
        self.require_field(field)?;

        let fields = self.fields_to_search(field);
        let mut seen: HashSet<String> = HashSet::new();
        let mut matches = Vec::new();

        for snap in self.snapshot().segments().iter().rev() {
            for f in &fields {
                let postings = match snap.search(term, f) {
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
                        tf: p.frequency as f64,
                        field_length: snap.segment().field_length(f, p.doc_num),
                        field: Some(f.clone()),
                    });
                }
            }
        }

        {
            let builder = self.snapshot().builder().read();
            for f in &fields {
                builder_term_matches(&builder, term, f, &mut seen, &mut matches);
            }
        }

        Ok(self.score_and_sort(matches, field))
    }

    /// Bitmap form of term search, used by the boolean planner
    pub(crate) fn term_docset(&self, term: &str, field: Option<&str>) -> Result<DocSet> {
        self.require_field(field)?;

        let fields = self.fields_to_search(field);
        let segments = self.snapshot().segments();
        let mut ds = DocSet::new(segments.len());

        for (i, snap) in segments.iter().enumerate() {
            for f in &fields {
                match snap.segment().search_bitmap(term, f, snap.deleted_filter()) {
                    Ok(bm) => ds.segment_docs[i] |= bm,
                    Err(SkaldError::FieldNotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        let builder = self.snapshot().builder().read();
        for f in &fields {
            let Some(postings) = builder.fields().get(f).and_then(|terms| terms.get(term)) else {
                continue;
            };
            for p in postings {
                if !builder.is_deleted(p.doc_num) {
                    ds.builder_docs.insert(p.doc_num as u32);
                }
            }
        }

        Ok(ds)
    }

    /// Union the docsets of many terms and materialize once.
    /// Used by prefix, regex, and fuzzy expansion; every hit scores tf = 1.0.
    pub(crate) fn multi_term_search(&self, terms: &[String], field: Option<&str>) -> Result<Vec<Hit>> {
        let mut sets = Vec::new();
        for term in terms {
            let ds = self.term_docset(term, field)?;
            if !ds.is_empty() {
                sets.push(ds);
            }
        }

        match union_all(sets) {
            Some(result) if !result.is_empty() => Ok(self.materialize(&result, field)),
            _ => Ok(Vec::new()),
        }
    }
}

/// Collect builder postings of one term into the match list
fn builder_term_matches(
    builder: &Builder,
    term: &str,
    field: &str,
    seen: &mut HashSet<String>,
    matches: &mut Vec<SearchMatch>,
) {
    let Some(postings) = builder.fields().get(field).and_then(|terms| terms.get(term)) else {
        return;
    };

    for p in postings {
        if builder.is_deleted(p.doc_num) {
            continue;
        }
        let Some(external_id) = builder.doc_ids().get(p.doc_num as usize) else {
            continue;
        };
        if seen.contains(external_id) {
            continue;
        }
        seen.insert(external_id.clone());

        matches.push(SearchMatch {
            doc_id: external_id.clone(),
            tf: p.frequency as f64,
            field_length: builder.field_length(field, p.doc_num),
            field: Some(field.to_string()),
        });
    }
}
