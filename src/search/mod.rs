//! Query execution against an index snapshot
//!
//! A [`Searcher`] borrows an [`IndexSnapshot`] and runs parsed queries
//! against its segments and the live builder. Leaf primitives produce
//! scored hits directly; boolean composition plans over per-segment bitmap
//! sets and materializes once at the end.

mod boolean;
mod docset;
mod multi_term;
mod phrase;
mod prefix;
mod score;
mod term;

pub use score::{BM25_B, BM25_K1};

use std::collections::BTreeSet;

use crate::error::{Result, SkaldError};
use crate::index::IndexSnapshot;
use crate::query::{parse, tokenize, Query};
use crate::segment::ID_FIELD;

/// A scored search result
#[derive(Clone, Debug, PartialEq)]
pub struct Hit {
    pub doc_id: String,
    pub score: f64,
}

/// Executes queries against one snapshot
pub struct Searcher<'a> {
    snapshot: &'a IndexSnapshot,
}

impl<'a> Searcher<'a> {
    pub fn new(snapshot: &'a IndexSnapshot) -> Self {
        Self { snapshot }
    }

    pub(crate) fn snapshot(&self) -> &IndexSnapshot {
        self.snapshot
    }

    /// Parse and execute a query string
    pub fn query(&self, query_str: &str) -> Result<Vec<Hit>> {
        let tokens = tokenize(query_str)?;
        let ast = parse(tokens)?;
        self.execute(&ast)
    }

    /// Execute a parsed query
    pub fn execute(&self, query: &Query) -> Result<Vec<Hit>> {
        match query {
            Query::Term { field, term } => {
                self.term_search(&term.to_lowercase(), field.as_deref())
            }
            Query::Phrase { field, phrase } => self.phrase_search(phrase, field.as_deref()),
            Query::Prefix { field, prefix } => {
                self.prefix_search(&prefix.to_lowercase(), field.as_deref())
            }
            Query::Regex { field, pattern } => self.regex_search(pattern, field.as_deref()),
            Query::Fuzzy {
                field,
                term,
                fuzziness,
            } => self.fuzzy_search(&term.to_lowercase(), *fuzziness, field.as_deref()),
            Query::Bool {
                must,
                should,
                must_not,
            } => self.bool_search(must, should, must_not),
            Query::MatchAll | Query::MatchNone => Ok(Vec::new()),
        }
    }

    /// Fields a primitive should consult: the explicit field, or every
    /// indexed field except `_id`
    pub(crate) fn fields_to_search(&self, field: Option<&str>) -> Vec<String> {
        if let Some(field) = field {
            return vec![field.to_string()];
        }

        let mut fields: BTreeSet<String> = BTreeSet::new();
        for snap in self.snapshot.segments() {
            for f in snap.segment().fields() {
                if f != ID_FIELD {
                    fields.insert(f.to_string());
                }
            }
        }
        for f in self.snapshot.builder().read().fields().keys() {
            if f != ID_FIELD {
                fields.insert(f.clone());
            }
        }

        fields.into_iter().collect()
    }

    /// Whether a field is indexed anywhere in the snapshot
    pub(crate) fn field_exists(&self, field: &str) -> bool {
        if self
            .snapshot
            .segments()
            .iter()
            .any(|snap| snap.segment().has_field(field))
        {
            return true;
        }
        self.snapshot.builder().read().fields().contains_key(field)
    }

    /// Explicitly field-qualified term / phrase / prefix primitives surface
    /// an error for fields that exist nowhere; multi-field search skips them
    pub(crate) fn require_field(&self, field: Option<&str>) -> Result<()> {
        match field {
            Some(f) if !self.field_exists(f) => Err(SkaldError::FieldNotFound(f.to_string())),
            _ => Ok(()),
        }
    }
}
