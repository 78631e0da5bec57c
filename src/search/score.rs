//! Relevance scoring: BM25 and TF-IDF
//!
//! Hits from one primitive share a document frequency (the hit count) and
//! are normalized by the average field length of the field they matched in.

use std::collections::HashMap;

use super::{Hit, Searcher};
use crate::config::ScoringMode;

/// Term frequency saturation parameter
pub const BM25_K1: f64 = 1.2;
/// Length normalization parameter
pub const BM25_B: f64 = 0.75;

/// A matched document before scoring
pub(crate) struct SearchMatch {
    pub doc_id: String,
    pub tf: f64,
    pub field_length: u64,
    pub field: Option<String>,
}

impl Searcher<'_> {
    /// Score matches and sort descending; equal scores keep insertion order
    pub(crate) fn score_and_sort(
        &self,
        matches: Vec<SearchMatch>,
        field: Option<&str>,
    ) -> Vec<Hit> {
        let total_docs = self.snapshot().total_docs();
        let df = matches.len() as u64;

        let mut hits = Vec::with_capacity(matches.len());

        match self.snapshot().scoring() {
            ScoringMode::Bm25 => {
                let idf =
                    (1.0 + (total_docs as f64 - df as f64 + 0.5) / (df as f64 + 0.5)).ln();

                let mut avg_cache: HashMap<String, f64> = HashMap::new();
                let mut avg_for = |searcher: &Searcher<'_>, f: Option<&str>| -> f64 {
                    let Some(f) = f else { return 1.0 };
                    if let Some(&avg) = avg_cache.get(f) {
                        return avg;
                    }
                    let avg = searcher.snapshot().avg_field_length(f).max(1.0);
                    avg_cache.insert(f.to_string(), avg);
                    avg
                };

                for m in matches {
                    let avg = avg_for(self, m.field.as_deref().or(field));
                    let len = if m.field_length == 0 {
                        avg
                    } else {
                        m.field_length as f64
                    };
                    let score = idf * (m.tf * (BM25_K1 + 1.0))
                        / (m.tf + BM25_K1 * (1.0 - BM25_B + BM25_B * len / avg));
                    hits.push(Hit {
                        doc_id: m.doc_id,
                        score,
                    });
                }
            }
            ScoringMode::TfIdf => {
                let idf = ((total_docs as f64 + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
                for m in matches {
                    let tf = if m.tf > 0.0 { 1.0 + m.tf.ln() } else { 0.0 };
                    hits.push(Hit {
                        doc_id: m.doc_id,
                        score: tf * idf,
                    });
                }
            }
        }

        sort_by_score(&mut hits);
        hits
    }
}

/// Stable descending sort by score
pub(crate) fn sort_by_score(hits: &mut [Hit]) {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
