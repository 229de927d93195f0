use connectors::error::{ExtractionError, WriteError};
use thiserror::Error;

/// Failures turning a source row into a document.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Key column '{column}' is missing or NULL")]
    MissingKey { column: String },

    #[error("Key columns {columns:?} produced an empty identifier")]
    EmptyIdentifier { columns: Vec<String> },

    #[error("Key column '{column}' holds a {kind} value, which cannot form an identifier")]
    UnsupportedKey { column: String, kind: &'static str },

    #[error("Malformed row: {0}")]
    Malformed(String),

    /// A condition that may clear on its own; eligible for retry.
    #[error("Transient transform failure: {0}")]
    Transient(String),
}

/// A writer in the chain failed; the name identifies which sink.
#[derive(Debug, Error)]
#[error("Writer '{writer}' failed: {source}")]
pub struct ChainError {
    pub writer: String,
    #[source]
    pub source: WriteError,
}

/// The job-wide skip budget was exceeded.
#[derive(Debug, Clone, Error)]
#[error("Skip limit of {limit} exceeded after {skipped} skipped items; last failure: {last_error}")]
pub struct LimitExceeded {
    pub limit: u64,
    pub skipped: u64,
    pub last_error: String,
}

/// Reasons a run ends in `Failed`.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    LimitExceeded(#[from] LimitExceeded),

    #[error("Chunk worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}
