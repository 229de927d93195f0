use crate::error::ConfigurationError;
use engine_core::monitor::config::MonitorConfig;
use std::path::{Path, PathBuf};

/// Process-wide connection and monitoring settings, shared by every job.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Postgres connection string of the relational source (and archive).
    pub source_url: String,
    /// MongoDB connection string of the document target.
    pub target_uri: String,
    /// Database used when a job does not name one.
    pub target_database: String,
    pub catalog_dir: PathBuf,
    pub state_dir: PathBuf,
    pub monitor: MonitorConfig,
    /// Per-listener event queue depth.
    pub event_capacity: usize,
}

impl EngineSettings {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.source_url.trim().is_empty() {
            return Err(ConfigurationError::Setting("source url is empty".into()));
        }
        if self.target_uri.trim().is_empty() {
            return Err(ConfigurationError::Setting("target uri is empty".into()));
        }
        if self.target_database.trim().is_empty() {
            return Err(ConfigurationError::Setting("target database is empty".into()));
        }
        if self.event_capacity == 0 {
            return Err(ConfigurationError::Setting(
                "event capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Reads monitor thresholds from a JSON file; omitted fields keep their defaults.
    pub fn load_monitor_config(path: &Path) -> Result<MonitorConfig, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
