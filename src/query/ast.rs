//! Query AST produced by the parser and consumed by the executor

use std::fmt;

/// A parsed query tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Query {
    /// Single term, optionally field-qualified
    Term {
        field: Option<String>,
        term: String,
    },
    /// Exact phrase with position adjacency
    Phrase {
        field: Option<String>,
        phrase: String,
    },
    /// All terms starting with a prefix
    Prefix {
        field: Option<String>,
        prefix: String,
    },
    /// All terms matching a regular expression
    Regex {
        field: Option<String>,
        pattern: String,
    },
    /// All terms within an edit distance of a term
    Fuzzy {
        field: Option<String>,
        term: String,
        fuzziness: u32,
    },
    /// Boolean combination of sub-queries
    Bool {
        must: Vec<Query>,
        should: Vec<Query>,
        must_not: Vec<Query>,
    },
    /// Matches every document (empty query string)
    MatchAll,
    /// Matches nothing (empty leaf value)
    MatchNone,
}

fn write_qualified(f: &mut fmt::Formatter<'_>, field: &Option<String>, value: &str) -> fmt::Result {
    match field {
        Some(field) => write!(f, "{field}:{value}"),
        None => write!(f, "{value}"),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term { field, term } => {
                write!(f, "term(")?;
                write_qualified(f, field, term)?;
                write!(f, ")")
            }
            Query::Phrase { field, phrase } => {
                write!(f, "phrase(")?;
                write_qualified(f, field, &format!("\"{phrase}\""))?;
                write!(f, ")")
            }
            Query::Prefix { field, prefix } => {
                write!(f, "prefix(")?;
                write_qualified(f, field, &format!("{prefix}*"))?;
                write!(f, ")")
            }
            Query::Regex { field, pattern } => {
                write!(f, "regex(")?;
                write_qualified(f, field, &format!("/{pattern}/"))?;
                write!(f, ")")
            }
            Query::Fuzzy {
                field,
                term,
                fuzziness,
            } => {
                write!(f, "fuzzy(")?;
                write_qualified(f, field, &format!("{term}~{fuzziness}"))?;
                write!(f, ")")
            }
            Query::Bool {
                must,
                should,
                must_not,
            } => {
                let mut parts = Vec::new();
                if !must.is_empty() {
                    let items: Vec<String> = must.iter().map(|q| q.to_string()).collect();
                    parts.push(format!("AND({})", items.join(", ")));
                }
                if !should.is_empty() {
                    let items: Vec<String> = should.iter().map(|q| q.to_string()).collect();
                    parts.push(format!("OR({})", items.join(", ")));
                }
                if !must_not.is_empty() {
                    let items: Vec<String> = must_not.iter().map(|q| q.to_string()).collect();
                    parts.push(format!("NOT({})", items.join(", ")));
                }
                if parts.is_empty() {
                    write!(f, "bool(empty)")
                } else {
                    write!(f, "bool({})", parts.join(" "))
                }
            }
            Query::MatchAll => write!(f, "match_all"),
            Query::MatchNone => write!(f, "match_none"),
        }
    }
}

impl Query {
    /// A boolean node carrying only negations
    pub fn is_pure_must_not(&self) -> bool {
        matches!(
            self,
            Query::Bool {
                must,
                should,
                must_not,
            } if must.is_empty() && should.is_empty() && !must_not.is_empty()
        )
    }
}
