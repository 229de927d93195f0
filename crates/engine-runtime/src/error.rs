use connectors::error::{ConnectorError, ExtractionError};
use engine_config::error::ConfigurationError;
use engine_core::error::StateStoreError;
use model::execution::run::RunStatus;
use thiserror::Error;

/// Top-level errors for the migration service.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A run with the same job and parameters is still in flight.
    #[error("Job '{job_name}' is already running with these parameters (run {run_id})")]
    AlreadyRunning { job_name: String, run_id: String },

    #[error("Run '{run_id}' of job '{job_name}' not found")]
    UnknownRun { job_name: String, run_id: String },

    #[error("Run '{run_id}' is {status} and cannot be restarted")]
    NotRestartable { run_id: String, status: RunStatus },

    #[error("State store error: {0}")]
    State(#[from] StateStoreError),

    #[error("Connection error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// An error occurred while joining a task.
    /// This usually indicates that the task was cancelled or panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}
