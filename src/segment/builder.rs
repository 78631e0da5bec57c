//! In-memory segment builder
//!
//! Accumulates documents until the index flushes them into an immutable
//! segment file. Postings are appended in document order, so every term's
//! posting list is already sorted by docnum.

use std::collections::HashMap;
use std::sync::Arc;

use roaring::RoaringBitmap;
use serde_json::Value;

use super::types::{Document, Posting, ID_FIELD};
use crate::analysis::Analyzer;

/// Mutable accumulation of documents before a flush
pub struct Builder {
    /// field -> term -> postings
    fields: HashMap<String, HashMap<String, Vec<Posting>>>,
    /// field -> docnum -> token count
    field_lengths: HashMap<String, Vec<u64>>,
    /// Stored documents by docnum
    docs: Vec<Document>,
    /// External ids by docnum
    doc_ids: Vec<String>,
    /// Docnums deleted while still in the builder
    deleted: RoaringBitmap,
    num_docs: u64,
    analyzer: Arc<dyn Analyzer>,
}

impl Builder {
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        Self {
            fields: HashMap::new(),
            field_lengths: HashMap::new(),
            docs: Vec::new(),
            doc_ids: Vec::new(),
            deleted: RoaringBitmap::new(),
            num_docs: 0,
            analyzer,
        }
    }

    /// Add a document and return its docnum.
    ///
    /// String-valued fields are analyzed and indexed; other value types are
    /// kept in the stored region only. The external id is registered under
    /// the reserved `_id` field with frequency 1 and position 1, which keeps
    /// it eligible for one-hit encoding.
    pub fn add(&mut self, external_id: &str, doc: Document) -> u64 {
        let doc_num = self.num_docs;
        self.num_docs += 1;

        self.doc_ids.push(external_id.to_string());

        self.fields.entry(ID_FIELD.to_string()).or_default().insert(
            external_id.to_string(),
            vec![Posting {
                doc_num,
                frequency: 1,
                positions: vec![1],
            }],
        );

        for (field_name, value) in &doc {
            let Value::String(text) = value else {
                continue;
            };

            let tokens = self.analyzer.analyze(text);

            let lengths = self.field_lengths.entry(field_name.clone()).or_default();
            while lengths.len() <= doc_num as usize {
                lengths.push(0);
            }
            lengths[doc_num as usize] = tokens.len() as u64;

            let mut term_positions: HashMap<&str, Vec<u64>> = HashMap::new();
            for tp in &tokens {
                term_positions.entry(&tp.token).or_default().push(tp.position);
            }

            let field_terms = self.fields.entry(field_name.clone()).or_default();
            for (term, positions) in term_positions {
                field_terms.entry(term.to_string()).or_default().push(Posting {
                    doc_num,
                    frequency: positions.len() as u64,
                    positions,
                });
            }
        }

        self.docs.push(doc);
        doc_num
    }

    /// Mark the newest non-deleted copy of an external id as deleted.
    /// Returns true if a copy was found.
    pub fn delete(&mut self, external_id: &str) -> bool {
        match self.find_doc_num(external_id) {
            Some(doc_num) => {
                self.deleted.insert(doc_num as u32);
                true
            }
            None => false,
        }
    }

    /// Locate the non-deleted docnum holding an external id, if any
    pub fn find_doc_num(&self, external_id: &str) -> Option<u64> {
        self.doc_ids.iter().enumerate().find_map(|(i, id)| {
            (id == external_id && !self.deleted.contains(i as u32)).then_some(i as u64)
        })
    }

    pub fn is_deleted(&self, doc_num: u64) -> bool {
        self.deleted.contains(doc_num as u32)
    }

    /// Number of live (non-deleted) documents
    pub fn num_docs(&self) -> u64 {
        self.num_docs - self.deleted.len()
    }

    /// Total documents including deleted ones, as persisted
    pub fn total_docs(&self) -> u64 {
        self.num_docs
    }

    pub fn is_empty(&self) -> bool {
        self.num_docs == 0
    }

    pub fn field_length(&self, field: &str, doc_num: u64) -> u64 {
        self.field_lengths
            .get(field)
            .and_then(|lengths| lengths.get(doc_num as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Average field length over live documents with at least one token
    pub fn avg_field_length(&self, field: &str) -> f64 {
        let Some(lengths) = self.field_lengths.get(field) else {
            return 0.0;
        };

        let mut total = 0u64;
        let mut count = 0u64;
        for (doc_num, &len) in lengths.iter().enumerate() {
            if len > 0 && !self.is_deleted(doc_num as u64) {
                total += len;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    pub fn fields(&self) -> &HashMap<String, HashMap<String, Vec<Posting>>> {
        &self.fields
    }

    pub fn field_lengths(&self) -> &HashMap<String, Vec<u64>> {
        &self.field_lengths
    }

    pub fn docs(&self) -> &[Document] {
        &self.docs
    }

    pub fn doc_ids(&self) -> &[String] {
        &self.doc_ids
    }

    pub fn deleted(&self) -> &RoaringBitmap {
        &self.deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::SimpleAnalyzer;
    use serde_json::json;

    fn test_builder() -> Builder {
        Builder::new(Arc::new(SimpleAnalyzer::new()))
    }

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_add_assigns_dense_docnums() {
        let mut builder = test_builder();
        assert_eq!(builder.add("a", doc(&[("body", json!("hello"))])), 0);
        assert_eq!(builder.add("b", doc(&[("body", json!("world"))])), 1);
        assert_eq!(builder.total_docs(), 2);
        assert_eq!(builder.num_docs(), 2);
    }

    #[test]
    fn test_postings_carry_positions_and_frequency() {
        let mut builder = test_builder();
        builder.add("a", doc(&[("body", json!("to be or not to be"))]));

        let postings = &builder.fields()["body"]["to"];
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].doc_num, 0);
        assert_eq!(postings[0].frequency, 2);
        assert_eq!(postings[0].positions, vec![0, 4]);
    }

    #[test]
    fn test_id_field_is_single_occurrence() {
        let mut builder = test_builder();
        builder.add("doc-1", doc(&[("body", json!("x"))]));

        let postings = &builder.fields()[ID_FIELD]["doc-1"];
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].frequency, 1);
        assert_eq!(postings[0].positions, vec![1]);
    }

    #[test]
    fn test_non_string_values_are_not_indexed() {
        let mut builder = test_builder();
        builder.add("a", doc(&[("title", json!("kept")), ("year", json!(2024))]));

        assert!(builder.fields().contains_key("title"));
        assert!(!builder.fields().contains_key("year"));
        // The stored document keeps the non-string value for round-trip.
        assert_eq!(builder.docs()[0]["year"], json!(2024));
    }

    #[test]
    fn test_delete_marks_newest_live_copy() {
        let mut builder = test_builder();
        builder.add("a", doc(&[("body", json!("one"))]));
        builder.add("b", doc(&[("body", json!("two"))]));

        assert!(builder.delete("a"));
        assert!(builder.is_deleted(0));
        assert_eq!(builder.num_docs(), 1);
        assert_eq!(builder.total_docs(), 2);

        // Already deleted: nothing left to mark.
        assert!(!builder.delete("a"));
        assert!(!builder.delete("missing"));
    }

    #[test]
    fn test_field_lengths() {
        let mut builder = test_builder();
        builder.add("a", doc(&[("body", json!("one two three"))]));
        builder.add("b", doc(&[("body", json!("four"))]));

        assert_eq!(builder.field_length("body", 0), 3);
        assert_eq!(builder.field_length("body", 1), 1);
        assert_eq!(builder.field_length("body", 9), 0);
        assert_eq!(builder.field_length("missing", 0), 0);
        assert!((builder.avg_field_length("body") - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_avg_field_length_excludes_deleted() {
        let mut builder = test_builder();
        builder.add("a", doc(&[("body", json!("one two three four"))]));
        builder.add("b", doc(&[("body", json!("five six"))]));
        builder.delete("a");

        assert!((builder.avg_field_length("body") - 2.0).abs() < f64::EPSILON);
    }
}
