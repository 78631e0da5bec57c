//! Regex and fuzzy search: automaton-guided term expansion
//!
//! Segments enumerate matching terms by driving an automaton over their
//! FSTs; builder terms are checked directly. The union of all matching
//! terms' documents is materialized with tf = 1.0.

use std::collections::BTreeSet;

use regex::Regex;

use super::{Hit, Searcher};
use crate::error::{Result, SkaldError};
use crate::segment::Segment;

impl Searcher<'_> {
    pub(crate) fn regex_search(&self, pattern: &str, field: Option<&str>) -> Result<Vec<Hit>> {
        // Whole-term semantics, matching the FST automaton.
        let re = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| SkaldError::InvalidQuery(format!("invalid regex pattern: {e}")))?;

        self.automaton_search(
            field,
            |seg, f| seg.matching_terms(pattern, f),
            |term| re.is_match(term),
        )
    }

    pub(crate) fn fuzzy_search(
        &self,
        term: &str,
        fuzziness: u32,
        field: Option<&str>,
    ) -> Result<Vec<Hit>> {
        self.automaton_search(
            field,
            |seg, f| seg.fuzzy_terms(term, fuzziness, f),
            |candidate| levenshtein_distance(term, candidate) <= fuzziness as usize,
        )
    }

    /// Collect matching terms from every segment and the builder, then run
    /// a multi-term union over them
    fn automaton_search(
        &self,
        field: Option<&str>,
        segment_terms: impl Fn(&Segment, &str) -> Result<Vec<String>>,
        builder_matcher: impl Fn(&str) -> bool,
    ) -> Result<Vec<Hit>> {
        let fields = self.fields_to_search(field);
        let mut matching: BTreeSet<String> = BTreeSet::new();

        for snap in self.snapshot().segments() {
            for f in &fields {
                match segment_terms(snap.segment(), f) {
                    Ok(terms) => matching.extend(terms),
                    Err(SkaldError::FieldNotFound(_)) => continue,
                    Err(e) => return Err(e),
                }
            }
        }

        {
            let builder = self.snapshot().builder().read();
            for f in &fields {
                let Some(field_terms) = builder.fields().get(f) else {
                    continue;
                };
                for term in field_terms.keys() {
                    if builder_matcher(term) {
                        matching.insert(term.clone());
                    }
                }
            }
        }

        if matching.is_empty() {
            return Ok(Vec::new());
        }

        let terms: Vec<String> = matching.into_iter().collect();
        self.multi_term_search(&terms, field)
    }
}

/// Plain Levenshtein edit distance; a transposition counts as two edits
pub(crate) fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("hello", "helo"), 1);
        assert_eq!(levenshtein_distance("flaw", "lawn"), 2);
    }

    #[test]
    fn test_transposition_counts_as_two() {
        assert_eq!(levenshtein_distance("ab", "ba"), 2);
    }
}
