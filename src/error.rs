use thiserror::Error;

/// Main error type for index and query operations
#[derive(Error, Debug)]
pub enum SkaldError {
    #[error("index is closed")]
    ClosedIndex,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt segment: {0}")]
    CorruptSegment(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("metadata store error: {0}")]
    Store(#[from] fjall::Error),

    #[error("term dictionary error: {0}")]
    Fst(#[from] fst::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for index and query operations
pub type Result<T> = std::result::Result<T, SkaldError>;
