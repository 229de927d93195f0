use crate::error::MigrationError;
use async_trait::async_trait;
use connectors::{
    mongo::{client::connect_database, writer::MongoUpsertWriter},
    probe::{HealthProbe, MongoProbe, PostgresProbe},
    reader::RowReader,
    sql::postgres::{archive::PgArchiveWriter, reader::PgRowReader},
    writer::DocumentWriter,
};
use engine_config::settings::EngineSettings;
use engine_processing::{
    transform::{RecordTransformer, Transform},
    writer::WriterChain,
};
use model::execution::job::JobSpec;
use std::sync::Arc;
use tracing::info;

/// Builds the per-run pieces of a pipeline from a job definition.
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    async fn open_reader(&self, job: &JobSpec) -> Result<Box<dyn RowReader>, MigrationError>;

    /// Upsert writer first, then the archive writer when the job enables it.
    async fn writers(&self, job: &JobSpec) -> Result<WriterChain, MigrationError>;

    fn transformer(&self, job: &JobSpec) -> Arc<dyn Transform> {
        Arc::new(RecordTransformer::from_job(job))
    }
}

/// Orders the sinks of a job: upsert first, archive last and only when enabled.
pub fn writer_chain(
    job: &JobSpec,
    upsert: Arc<dyn DocumentWriter>,
    archive: Option<Arc<dyn DocumentWriter>>,
) -> WriterChain {
    let chain = WriterChain::default().with_writer(upsert);
    match archive {
        Some(archive) if job.archive.enabled => chain.with_writer(archive),
        _ => chain,
    }
}

/// Connects to the live Postgres source and MongoDB target.
pub struct LivePipelineFactory {
    settings: EngineSettings,
}

impl LivePipelineFactory {
    pub fn new(settings: EngineSettings) -> Self {
        Self { settings }
    }

    fn target_database<'a>(&'a self, job: &'a JobSpec) -> &'a str {
        job.target
            .database
            .as_deref()
            .filter(|db| !db.is_empty())
            .unwrap_or(&self.settings.target_database)
    }

    /// Reachability checks for both stores, used by the monitor's health report.
    pub fn probes(&self) -> Vec<Arc<dyn HealthProbe>> {
        vec![
            Arc::new(PostgresProbe {
                conn_str: self.settings.source_url.clone(),
            }),
            Arc::new(MongoProbe {
                uri: self.settings.target_uri.clone(),
                database: self.settings.target_database.clone(),
            }),
        ]
    }
}

#[async_trait]
impl PipelineFactory for LivePipelineFactory {
    async fn open_reader(&self, job: &JobSpec) -> Result<Box<dyn RowReader>, MigrationError> {
        let reader = PgRowReader::open(
            &self.settings.source_url,
            &job.source,
            job.tunables.fetch_size,
        )
        .await?;
        Ok(Box::new(reader))
    }

    async fn writers(&self, job: &JobSpec) -> Result<WriterChain, MigrationError> {
        let database = connect_database(&self.settings.target_uri, self.target_database(job)).await?;
        let upsert = Arc::new(MongoUpsertWriter::new(&database, &job.target.collection));

        let mut archive: Option<Arc<dyn DocumentWriter>> = None;
        if job.archive.enabled
            && let Some(table) = job.archive.table.as_deref()
        {
            archive = Some(Arc::new(
                PgArchiveWriter::connect(&self.settings.source_url, table).await?,
            ));
        }

        let chain = writer_chain(job, upsert, archive);

        info!(job = %job.name, writers = ?chain.names(), "Writer chain ready");
        Ok(chain)
    }
}
