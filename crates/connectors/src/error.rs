use thiserror::Error;

/// Failures while establishing a connection to either store.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),

    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    Connection(#[from] tokio_postgres::Error),

    /// MongoDB driver error.
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Unexpected probe result: {0}")]
    UnexpectedResult(String),
}

/// Raised by the row extractor. Never skipped or retried: it ends the read sequence.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to open cursor on '{table}': {source}")]
    Open {
        table: String,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("Failed to fetch rows: {0}")]
    Fetch(#[source] tokio_postgres::Error),

    #[error("Failed to decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("Source connection error: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Extraction error: {0}")]
    Other(String),
}

/// Raised by sink writers. Chunk-scoped and eligible for retry or skip.
#[derive(Debug, Error)]
pub enum WriteError {
    /// PostgreSQL driver error from the archive writer.
    #[error("PostgreSQL write error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// MongoDB driver error from the upsert writer.
    #[error("MongoDB write error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Failed to encode document '{id}': {reason}")]
    Encode { id: String, reason: String },

    /// Temporary condition such as pool exhaustion; worth another attempt.
    #[error("Transient write failure: {0}")]
    Transient(String),

    /// The sink refused the document; another attempt would fail the same way.
    #[error("Write rejected: {0}")]
    Rejected(String),
}
