//! Text analysis: turning field values into token streams
//!
//! The same analyzer runs at index time and query time so that terms are
//! comparable byte-for-byte. Implementations must be deterministic and pure.

/// A token together with its 0-based ordinal position within a field value
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPosition {
    pub token: String,
    pub position: u64,
}

/// Text analyzer contract shared by the index writer and the query engine
pub trait Analyzer: Send + Sync {
    /// Tokenize text into an ordered sequence of (token, position) pairs
    fn analyze(&self, text: &str) -> Vec<TokenPosition>;
}

/// Default analyzer: lowercases and emits maximal alphanumeric runs.
///
/// Every non-alphanumeric character acts as a separator. Positions increment
/// by one per emitted token, starting at zero.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleAnalyzer;

impl SimpleAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for SimpleAnalyzer {
    fn analyze(&self, text: &str) -> Vec<TokenPosition> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut position = 0u64;

        for ch in text.chars().flat_map(char::to_lowercase) {
            if ch.is_alphanumeric() {
                current.push(ch);
            } else if !current.is_empty() {
                tokens.push(TokenPosition {
                    token: std::mem::take(&mut current),
                    position,
                });
                position += 1;
            }
        }

        if !current.is_empty() {
            tokens.push(TokenPosition {
                token: current,
                position,
            });
        }

        tokens
    }
}
