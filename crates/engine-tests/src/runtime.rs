#[cfg(test)]
mod tests {
    use crate::{
        fakes::{FakeFactory, MemoryRunStore, RecordingWriter},
        utils::{job, order_rows},
    };
    use engine_config::{catalog::memory::StaticJobCatalog, error::ConfigurationError};
    use engine_core::{
        monitor::{RunMonitor, config::MonitorConfig, sink::TracingMetricsSink},
        state::{RunStore, sled_store::SledRunStore},
    };
    use engine_runtime::{
        error::MigrationError,
        service::{MigrationService, RunParams},
    };
    use model::execution::run::RunStatus;
    use std::{sync::Arc, time::Duration};

    const JOB: &str = "orders";

    fn service(factory: Arc<FakeFactory>, store: Arc<dyn RunStore>) -> MigrationService {
        let catalog = StaticJobCatalog::new([job(JOB, 100, 5, 2), job("invoices", 100, 5, 2)])
            .unwrap();
        let monitor = Arc::new(RunMonitor::new(
            MonitorConfig::default(),
            Arc::new(TracingMetricsSink),
        ));
        MigrationService::new(Arc::new(catalog), store, monitor, factory)
    }

    fn slow_factory(rows: usize) -> Arc<FakeFactory> {
        Arc::new(
            FakeFactory::new(order_rows(rows, &[]))
                .with_upsert(RecordingWriter::new("upsert").with_delay(Duration::from_millis(100))),
        )
    }

    #[tokio::test]
    async fn completed_run_is_recorded_and_monitored() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn RunStore> = Arc::new(SledRunStore::open(dir.path()).unwrap());
        let factory = Arc::new(FakeFactory::new(order_rows(250, &[])));
        let service = service(factory.clone(), store);

        let handle = service.run_job(JOB, RunParams::now()).await.unwrap();
        let run_id = handle.run_id().to_string();
        let token = handle.token().to_string();
        let report = handle.wait().await.unwrap();

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.stats.documents_written, 250);
        assert_eq!(factory.upsert.documents().len(), 250);
        assert_eq!(factory.archive.call_count(), 0);

        let history = service.history(JOB, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, run_id);
        assert_eq!(history[0].token, token);
        assert_eq!(history[0].status, RunStatus::Completed);
        assert_eq!(history[0].stats.documents_written, 250);
        assert_eq!(history[0].stats.chunks_committed, 3);

        let view = service.monitor().status(JOB, &run_id).await.unwrap();
        assert_eq!(view.status, RunStatus::Completed);
        let stats = service.monitor().statistics().await;
        assert_eq!(stats.successful_runs, 1);
        assert!(service.active_run_ids().await.is_empty());
    }

    #[tokio::test]
    async fn identical_submission_is_rejected_while_running() {
        let service = service(slow_factory(300), Arc::new(MemoryRunStore::default()));
        let params = RunParams::now().with_param("region", "EU");

        let first = service.run_job(JOB, params.clone()).await.unwrap();
        let err = service.run_job(JOB, params.clone()).await.err().unwrap();
        assert!(matches!(
            &err,
            MigrationError::AlreadyRunning { run_id, .. } if run_id == first.run_id()
        ));

        // Different parameters form a different token.
        let other = service
            .run_job(JOB, params.clone().with_param("region", "US"))
            .await
            .unwrap();

        assert_eq!(first.wait().await.unwrap().status, RunStatus::Completed);
        assert_eq!(other.wait().await.unwrap().status, RunStatus::Completed);

        // Released once the first run finished.
        let again = service.run_job(JOB, params).await.unwrap();
        assert_eq!(again.wait().await.unwrap().status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn failed_open_is_reported_and_restartable() {
        let store = Arc::new(MemoryRunStore::default());
        let factory = Arc::new(FakeFactory::new(order_rows(40, &[])));
        factory.set_fail_open(true);
        let service = service(factory.clone(), store.clone());

        let handle = service
            .run_job(JOB, RunParams::now().with_param("batch", "7"))
            .await
            .unwrap();
        let failed_id = handle.run_id().to_string();
        let report = handle.wait().await.unwrap();

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.as_deref().unwrap_or_default().contains("does not exist"));
        let record = store.run(JOB, &failed_id).await.unwrap().unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        assert_eq!(service.monitor().statistics().await.failed_runs, 1);

        factory.set_fail_open(false);
        let restarted = service.restart_failed(JOB, &failed_id).await.unwrap();
        assert_ne!(restarted.run_id(), failed_id);
        let restarted_id = restarted.run_id().to_string();
        let report = restarted.wait().await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(factory.upsert.documents().len(), 40);

        let record = store.run(JOB, &restarted_id).await.unwrap().unwrap();
        assert_eq!(record.params.get("batch").map(String::as_str), Some("7"));
        assert_eq!(store.len(), 2);

        assert!(matches!(
            service.restart_failed(JOB, &restarted_id).await,
            Err(MigrationError::NotRestartable { status: RunStatus::Completed, .. })
        ));
        assert!(matches!(
            service.restart_failed(JOB, "missing").await,
            Err(MigrationError::UnknownRun { .. })
        ));
    }

    #[tokio::test]
    async fn stopping_a_run_ends_it_as_stopped() {
        let service = service(slow_factory(1000), Arc::new(MemoryRunStore::default()));

        let handle = service.run_job(JOB, RunParams::now()).await.unwrap();
        let run_id = handle.run_id().to_string();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(service.stop_run(&run_id).await);
        let report = handle.wait().await.unwrap();

        assert_eq!(report.status, RunStatus::Stopped);
        assert!(report.stats.documents_written < 1000);
        assert!(!service.stop_run(&run_id).await);
    }

    #[tokio::test]
    async fn unknown_job_is_a_configuration_error() {
        let service = service(
            Arc::new(FakeFactory::new(Vec::new())),
            Arc::new(MemoryRunStore::default()),
        );

        let err = service.run_job("nope", RunParams::now()).await.err().unwrap();
        assert!(matches!(
            err,
            MigrationError::Configuration(ConfigurationError::UnknownJob(name)) if name == "nope"
        ));
        assert_eq!(service.available_jobs().await.unwrap(), vec!["invoices", "orders"]);
    }

    #[tokio::test]
    async fn history_failure_releases_the_token() {
        let factory = Arc::new(FakeFactory::new(order_rows(10, &[])));
        let service = service(factory.clone(), Arc::new(MemoryRunStore::failing_starts()));
        let params = RunParams::now();

        assert!(matches!(
            service.run_job(JOB, params.clone()).await,
            Err(MigrationError::State(_))
        ));
        assert!(service.active_run_ids().await.is_empty());
        assert_eq!(factory.opened(), 0);
    }
}
