use crate::error::ConfigurationError;
use async_trait::async_trait;
use model::execution::job::JobSpec;

pub mod file;
pub mod memory;

/// Supplies validated job definitions by name.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// A fresh, validated spec. Implementations may reload changed definitions.
    async fn job(&self, name: &str) -> Result<JobSpec, ConfigurationError>;

    async fn job_names(&self) -> Result<Vec<String>, ConfigurationError>;
}
