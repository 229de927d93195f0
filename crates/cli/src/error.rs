use connectors::error::ConnectorError;
use engine_config::error::ConfigurationError;
use engine_core::error::StateStoreError;
use engine_runtime::error::MigrationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid settings: {0}")]
    Config(String),

    #[error("Invalid run parameter '{0}' (expected KEY=VALUE)")]
    InvalidParam(String),

    #[error("Failed to run the migration: {0}")]
    Runner(#[from] MigrationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Run history error: {0}")]
    State(#[from] StateStoreError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Invalid connection format provided: {0}")]
    InvalidConnectionFormat(String),

    #[error("Connection check failed: {0}")]
    Connection(#[from] ConnectorError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
