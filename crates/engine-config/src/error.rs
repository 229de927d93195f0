use std::path::PathBuf;
use thiserror::Error;

/// Raised before a run starts. A run is never launched from a job that fails here.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Job '{0}' is not defined")]
    UnknownJob(String),

    #[error("Invalid job '{job}': {reason}")]
    Invalid { job: String, reason: String },

    #[error("Failed to read job file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse job file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid engine setting: {0}")]
    Setting(String),
}
