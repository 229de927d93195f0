use crate::{
    error::MigrationError,
    factory::{LivePipelineFactory, PipelineFactory},
};
use chrono::{DateTime, Utc};
use connectors::reader::RowReader;
use engine_config::{
    catalog::{JobCatalog, file::FileJobCatalog},
    settings::EngineSettings,
};
use engine_core::{
    event_bus::{
        EventBus,
        listener::{AttachedListener, RunListener},
    },
    monitor::{RunMonitor, sink::TracingMetricsSink},
    state::{RunStore, listener::StoreListener, models::RunRecord, sled_store::SledRunStore},
};
use engine_processing::{
    executor::{ChunkExecutor, ExecutorParams, publish_failed_run},
    writer::WriterChain,
};
use model::execution::{
    job::JobSpec,
    run::{RunReport, RunStatus},
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Parameters of one submission. Together with the job name they form the run token.
#[derive(Debug, Clone, PartialEq)]
pub struct RunParams {
    pub params: BTreeMap<String, String>,
    pub submitted_at: DateTime<Utc>,
}

impl RunParams {
    pub fn now() -> Self {
        Self {
            params: BTreeMap::new(),
            submitted_at: Utc::now(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Stable digest of job name, submission time and parameters.
    pub fn token(&self, job_name: &str) -> String {
        let mut h = blake3::Hasher::new();
        h.update(job_name.as_bytes());
        h.update(b":");
        h.update(self.submitted_at.timestamp_millis().to_string().as_bytes());
        for (key, value) in &self.params {
            h.update(b":");
            h.update(key.as_bytes());
            h.update(b"=");
            h.update(value.as_bytes());
        }
        format!("tok-{}", &h.finalize().to_hex()[..16])
    }
}

struct ActiveRun {
    run_id: String,
    job_name: String,
    cancel: CancellationToken,
}

type ActiveRuns = Arc<Mutex<HashMap<String, ActiveRun>>>;

/// A submitted run. Dropping the handle leaves the run going; `stop` asks it to
/// finish after the chunks already in flight.
pub struct RunHandle {
    run_id: String,
    job_name: String,
    token: String,
    cancel: CancellationToken,
    join: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Resolves once the run is terminal and every listener has seen its events.
    pub async fn wait(self) -> Result<RunReport, MigrationError> {
        Ok(self.join.await?)
    }
}

/// Entry point for launching and inspecting migration runs.
pub struct MigrationService {
    catalog: Arc<dyn JobCatalog>,
    store: Arc<dyn RunStore>,
    monitor: Arc<RunMonitor>,
    factory: Arc<dyn PipelineFactory>,
    active: ActiveRuns,
    shutdown: CancellationToken,
    event_capacity: usize,
}

impl MigrationService {
    pub fn new(
        catalog: Arc<dyn JobCatalog>,
        store: Arc<dyn RunStore>,
        monitor: Arc<RunMonitor>,
        factory: Arc<dyn PipelineFactory>,
    ) -> Self {
        Self {
            catalog,
            store,
            monitor,
            factory,
            active: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Wires the file catalog, sled history and live connectors from settings.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, MigrationError> {
        settings.validate()?;

        let catalog = Arc::new(FileJobCatalog::new(&settings.catalog_dir));
        let store = Arc::new(SledRunStore::open(&settings.state_dir)?);
        let factory = LivePipelineFactory::new(settings.clone());
        let monitor = Arc::new(
            RunMonitor::new(settings.monitor.clone(), Arc::new(TracingMetricsSink))
                .with_probes(factory.probes()),
        );

        Ok(Self::new(catalog, store, monitor, Arc::new(factory))
            .with_event_capacity(settings.event_capacity))
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn monitor(&self) -> &Arc<RunMonitor> {
        &self.monitor
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Starts periodic eviction of expired run statuses; ends on `shutdown`.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        self.monitor.spawn_eviction(self.shutdown.child_token())
    }

    pub async fn available_jobs(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.catalog.job_names().await?)
    }

    pub async fn job(&self, job_name: &str) -> Result<JobSpec, MigrationError> {
        Ok(self.catalog.job(job_name).await?)
    }

    pub async fn history(
        &self,
        job_name: &str,
        limit: usize,
    ) -> Result<Vec<RunRecord>, MigrationError> {
        Ok(self.store.runs_for_job(job_name, limit).await?)
    }

    /// Loads a fresh job definition and launches a run of it in the background.
    pub async fn run_job(
        &self,
        job_name: &str,
        params: RunParams,
    ) -> Result<RunHandle, MigrationError> {
        let job = self.catalog.job(job_name).await?;
        let token = params.token(&job.name);
        let run_id = Uuid::new_v4().to_string();
        let cancel = self.shutdown.child_token();

        {
            let mut active = self.active.lock().await;
            if let Some(existing) = active.get(&token) {
                return Err(MigrationError::AlreadyRunning {
                    job_name: existing.job_name.clone(),
                    run_id: existing.run_id.clone(),
                });
            }
            active.insert(
                token.clone(),
                ActiveRun {
                    run_id: run_id.clone(),
                    job_name: job.name.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        let started_at = Utc::now();
        let record = RunRecord::started(&run_id, &job.name, &token, params.params, started_at);
        if let Err(err) = self.store.record_run_start(&record).await {
            self.active.lock().await.remove(&token);
            return Err(err.into());
        }

        let bus = EventBus::new();
        let store_listener: Arc<dyn RunListener> =
            Arc::new(StoreListener::new(Arc::clone(&self.store)));
        let monitor_listener: Arc<dyn RunListener> = self.monitor.clone();
        let listeners = vec![
            AttachedListener::attach(&bus, store_listener, self.event_capacity).await,
            AttachedListener::attach(&bus, monitor_listener, self.event_capacity).await,
        ];

        info!(job = %job.name, run_id = %run_id, token = %token, "Run submitted");

        let task = RunTask {
            job,
            run_id: run_id.clone(),
            token: token.clone(),
            started_at,
            bus,
            listeners,
            cancel: cancel.clone(),
            factory: Arc::clone(&self.factory),
            active: Arc::clone(&self.active),
        };
        let job_name = task.job.name.clone();
        let join = tokio::spawn(task.run());

        Ok(RunHandle {
            run_id,
            job_name,
            token,
            cancel,
            join,
        })
    }

    /// Runs a failed or stopped run again from the start with its original parameters.
    /// Upserts are keyed by document id, so rows written the first time are overwritten.
    pub async fn restart_failed(
        &self,
        job_name: &str,
        run_id: &str,
    ) -> Result<RunHandle, MigrationError> {
        let record = self.store.run(job_name, run_id).await?.ok_or_else(|| {
            MigrationError::UnknownRun {
                job_name: job_name.to_string(),
                run_id: run_id.to_string(),
            }
        })?;

        if !matches!(record.status, RunStatus::Failed | RunStatus::Stopped) {
            return Err(MigrationError::NotRestartable {
                run_id: run_id.to_string(),
                status: record.status,
            });
        }

        info!(job = %job_name, previous_run = %run_id, "Restarting run");
        let params = RunParams {
            params: record.params,
            submitted_at: Utc::now(),
        };
        self.run_job(job_name, params).await
    }

    /// Asks an in-flight run to stop. Returns false if no such run is active.
    pub async fn stop_run(&self, run_id: &str) -> bool {
        let active = self.active.lock().await;
        match active.values().find(|run| run.run_id == run_id) {
            Some(run) => {
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub async fn active_run_ids(&self) -> Vec<String> {
        self.active
            .lock()
            .await
            .values()
            .map(|run| run.run_id.clone())
            .collect()
    }

    /// Stops every active run and background task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

struct RunTask {
    job: JobSpec,
    run_id: String,
    token: String,
    started_at: DateTime<Utc>,
    bus: EventBus,
    listeners: Vec<AttachedListener>,
    cancel: CancellationToken,
    factory: Arc<dyn PipelineFactory>,
    active: ActiveRuns,
}

impl RunTask {
    async fn run(self) -> RunReport {
        let report = match self.open().await {
            Ok((mut reader, writers)) => {
                let executor = ChunkExecutor::new(ExecutorParams {
                    run_id: self.run_id.clone(),
                    job: self.job.clone(),
                    transformer: self.factory.transformer(&self.job),
                    writers,
                    bus: self.bus.clone(),
                    cancel: self.cancel.clone(),
                });
                executor.execute(reader.as_mut()).await.report
            }
            Err(err) => {
                warn!(job = %self.job.name, run_id = %self.run_id, error = %err, "Run could not start");
                publish_failed_run(
                    &self.bus,
                    &self.run_id,
                    &self.job.name,
                    self.started_at,
                    err.to_string(),
                )
                .await
            }
        };

        for listener in self.listeners {
            listener.detach(&self.bus).await;
        }
        self.active.lock().await.remove(&self.token);

        report
    }

    async fn open(&self) -> Result<(Box<dyn RowReader>, WriterChain), MigrationError> {
        // Writers first, so an unreachable target never leaves a source cursor open.
        let writers = self.factory.writers(&self.job).await?;
        let reader = self.factory.open_reader(&self.job).await?;
        Ok((reader, writers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn token_depends_on_job_time_and_params() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let params = RunParams {
            params: BTreeMap::new(),
            submitted_at: at,
        }
        .with_param("region", "EU");

        let token = params.token("orders");
        assert!(token.starts_with("tok-"));
        assert_eq!(token, params.clone().token("orders"));
        assert_ne!(token, params.token("invoices"));
        assert_ne!(token, params.clone().with_param("region", "US").token("orders"));

        let later = RunParams {
            submitted_at: at + chrono::Duration::seconds(1),
            ..params.clone()
        };
        assert_ne!(token, later.token("orders"));
    }
}
