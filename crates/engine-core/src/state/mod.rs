use crate::{error::StateStoreError, state::models::RunRecord};
use async_trait::async_trait;
use model::{execution::run::RunReport, records::chunk::ChunkSummary};

pub mod listener;
pub mod models;
pub mod sled_store;

/// Persistent run history. The pipeline only writes; the CLI and runtime read it back.
#[async_trait]
pub trait RunStore: Send + Sync {
    async fn record_run_start(&self, record: &RunRecord) -> Result<(), StateStoreError>;

    async fn record_run_progress(
        &self,
        job_name: &str,
        run_id: &str,
        chunk: &ChunkSummary,
        committed: bool,
    ) -> Result<(), StateStoreError>;

    async fn record_run_end(&self, report: &RunReport) -> Result<(), StateStoreError>;

    async fn run(&self, job_name: &str, run_id: &str) -> Result<Option<RunRecord>, StateStoreError>;

    /// Newest first.
    async fn runs_for_job(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, StateStoreError>;
}
