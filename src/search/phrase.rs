//! Phrase search with position adjacency
//!
//! A phrase of tokens `t0..tn-1` matches a document when some start
//! position `p` satisfies `p + i ∈ positions(ti)` for every token. Token
//! order is significant; partial overlaps do not match.

use std::collections::{HashMap, HashSet};

use super::score::SearchMatch;
use super::{Hit, Searcher};
use crate::error::{Result, SkaldError};
use crate::index::SegmentSnapshot;
use crate::segment::Builder;

impl Searcher<'_> {
    pub(crate) fn phrase_search(&self, phrase: &str, field: Option<&str>) -> Result<Vec<Hit>> {
        self.require_field(field)?;

        let tokens = self.snapshot().analyzer().analyze(phrase);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let terms: Vec<String> = tokens.into_iter().map(|t| t.token).collect();
        if terms.len() == 1 {
            return self.term_search(&terms[0], field);
        }

        let fields = self.fields_to_search(field);
        let mut seen: HashSet<String> = HashSet::new();
        let mut matches = Vec::new();

        for f in &fields {
            for snap in self.snapshot().segments().iter().rev() {
                self.phrase_match_in_segment(snap, &terms, f, &mut seen, &mut matches)?;
            }

            let builder = self.snapshot().builder().read();
            phrase_match_in_builder(&builder, &terms, f, &mut seen, &mut matches);
        }

        Ok(self.score_and_sort(matches, field))
    }

    fn phrase_match_in_segment(
        &self,
        snap: &SegmentSnapshot,
        terms: &[String],
        field: &str,
        seen: &mut HashSet<String>,
        matches: &mut Vec<SearchMatch>,
    ) -> Result<()> {
        let mut term_postings = Vec::with_capacity(terms.len());
        for term in terms {
            let postings = match snap.search(term, field) {
                Ok(postings) if !postings.is_empty() => postings,
                Ok(_) => return Ok(()),
                Err(SkaldError::FieldNotFound(_)) => return Ok(()),
                Err(e) => return Err(e),
            };
            term_postings.push(postings);
        }

        for doc_num in matching_docs(&term_postings) {
            let Some(external_id) = snap.segment().external_id(doc_num) else {
                continue;
            };
            if seen.contains(external_id) {
                continue;
            }
            seen.insert(external_id.to_string());

            matches.push(SearchMatch {
                doc_id: external_id.to_string(),
                tf: 1.0,
                field_length: snap.segment().field_length(field, doc_num),
                field: Some(field.to_string()),
            });
        }

        Ok(())
    }
}

/// Docs (sorted) whose per-term positions line up adjacently
fn matching_docs(term_postings: &[Vec<crate::segment::Posting>]) -> Vec<u64> {
    // Candidates come from the first term; other terms fill in positions.
    let mut candidates: HashMap<u64, Vec<&[u64]>> = HashMap::new();
    for p in &term_postings[0] {
        candidates.insert(p.doc_num, vec![&[] as &[u64]; term_postings.len()]);
    }

    for (i, postings) in term_postings.iter().enumerate() {
        for p in postings {
            if let Some(slots) = candidates.get_mut(&p.doc_num) {
                slots[i] = &p.positions;
            }
        }
    }

    let mut doc_nums: Vec<u64> = candidates
        .iter()
        .filter(|(_, slots)| {
            slots.iter().all(|positions| !positions.is_empty()) && phrase_match(slots)
        })
        .map(|(&doc_num, _)| doc_num)
        .collect();
    doc_nums.sort_unstable();
    doc_nums
}

/// Adjacency check: scan the shortest positions list, test membership in
/// the others
fn phrase_match(positions: &[&[u64]]) -> bool {
    let Some((shortest_idx, shortest)) = positions
        .iter()
        .enumerate()
        .min_by_key(|(_, list)| list.len())
    else {
        return false;
    };

    for &anchor in *shortest {
        let Some(start) = anchor.checked_sub(shortest_idx as u64) else {
            continue;
        };
        let aligned = positions
            .iter()
            .enumerate()
            .all(|(i, list)| list.contains(&(start + i as u64)));
        if aligned {
            return true;
        }
    }

    false
}

fn phrase_match_in_builder(
    builder: &Builder,
    terms: &[String],
    field: &str,
    seen: &mut HashSet<String>,
    matches: &mut Vec<SearchMatch>,
) {
    let Some(field_terms) = builder.fields().get(field) else {
        return;
    };

    let mut term_postings = Vec::with_capacity(terms.len());
    for term in terms {
        match field_terms.get(term) {
            Some(postings) if !postings.is_empty() => term_postings.push(postings.clone()),
            _ => return,
        }
    }

    for doc_num in matching_docs(&term_postings) {
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

        matches.push(SearchMatch {
            doc_id: external_id.clone(),
            tf: 1.0,
            field_length: builder.field_length(field, doc_num),
            field: Some(field.to_string()),
        });
    }
}
