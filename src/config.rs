use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Scoring formula applied to query results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// Okapi BM25 with k1 = 1.2, b = 0.75
    #[default]
    Bm25,
    /// Classic TF-IDF with log-scaled term frequency
    TfIdf,
}

/// Index configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Directory holding segment files and the metadata store
    pub dir: PathBuf,
    /// Number of live builder documents that triggers an automatic flush
    pub flush_threshold: usize,
    /// Scoring formula for query results
    pub scoring: ScoringMode,
}

impl IndexConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            flush_threshold: 1000,
            scoring: ScoringMode::Bm25,
        }
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    pub fn with_scoring(mut self, scoring: ScoringMode) -> Self {
        self.scoring = scoring;
        self
    }
}
