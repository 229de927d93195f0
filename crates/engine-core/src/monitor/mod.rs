use crate::{
    event_bus::listener::RunListener,
    monitor::{
        alert::{Alert, AlertHistory, AlertKind, AlertSeverity},
        config::MonitorConfig,
        health::{HealthReport, ProbeStatus, classify},
        registry::{RunStatusView, StatusRegistry},
        sink::MetricsSink,
        stats::{DurationStats, MonitorStatistics, WindowStats},
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use connectors::probe::HealthProbe;
use futures::future::join_all;
use model::{
    events::RunEvent,
    execution::run::{RunReport, RunStatus},
    records::chunk::ChunkSummary,
};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{sync::Mutex, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub mod alert;
pub mod config;
pub mod health;
pub mod registry;
pub mod sink;
pub mod stats;

#[derive(Debug, Default)]
struct Totals {
    runs_started: AtomicU64,
    runs_completed: AtomicU64,
    runs_failed: AtomicU64,
    runs_stopped: AtomicU64,
    active_runs: AtomicU64,
    records_processed: AtomicU64,
    error_records: AtomicU64,
}

/// Counters, timers and threshold alerts derived from run events.
///
/// One monitor is shared by every run in the process. Per-run state lives in a
/// [`StatusRegistry`]; finished runs are evicted once they fall out of the retention window.
pub struct RunMonitor {
    config: MonitorConfig,
    sink: Arc<dyn MetricsSink>,
    probes: Vec<Arc<dyn HealthProbe>>,
    registry: StatusRegistry,
    alerts: Mutex<AlertHistory>,
    durations: Mutex<DurationStats>,
    totals: Totals,
}

impl RunMonitor {
    pub fn new(config: MonitorConfig, sink: Arc<dyn MetricsSink>) -> Self {
        Self {
            registry: StatusRegistry::new(config.retention()),
            alerts: Mutex::new(AlertHistory::new(config.alert_history_size)),
            durations: Mutex::new(DurationStats::default()),
            totals: Totals::default(),
            probes: Vec::new(),
            config,
            sink,
        }
    }

    /// Reachability probes consulted by [`RunMonitor::health`].
    pub fn with_probes(mut self, probes: Vec<Arc<dyn HealthProbe>>) -> Self {
        self.probes = probes;
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    async fn on_run_started(&self, run_id: &str, job_name: &str, started_at: DateTime<Utc>) {
        self.totals.runs_started.fetch_add(1, Ordering::Relaxed);
        let active = self.totals.active_runs.fetch_add(1, Ordering::Relaxed) + 1;

        self.registry
            .insert(RunStatusView::new(run_id, job_name, started_at))
            .await;

        self.sink.increment("migration.runs.started", 1, job_name);
        self.sink.gauge("migration.runs.active", active as f64, job_name);
        info!(job = %job_name, run_id = %run_id, active_runs = active, "Run started");
    }

    async fn on_chunk(
        &self,
        run_id: &str,
        job_name: &str,
        summary: &ChunkSummary,
        abort_error: Option<&str>,
    ) {
        let committed = abort_error.is_none();
        let now = Utc::now();
        let active = self.totals.active_runs.load(Ordering::Relaxed);

        self.totals
            .records_processed
            .fetch_add(summary.written_count, Ordering::Relaxed);
        self.totals
            .error_records
            .fetch_add(summary.skipped(), Ordering::Relaxed);

        let config = &self.config;
        let (pending, rate) = self
            .registry
            .update(job_name, run_id, |view| {
                view.stats.record_chunk(summary, committed);
                view.errors += summary.skipped() + u64::from(!committed);
                if let Some(error) = abort_error {
                    view.last_error = Some(error.to_string());
                }
                view.updated_at = now;
                view.refresh_rate(now);

                let mut breaches = run_breaches(config, view);
                if let Some(message) = active_breach(config, active) {
                    breaches.push((AlertKind::ActiveRuns, message));
                }

                // Each condition alerts once per run.
                let pending: Vec<_> = breaches
                    .into_iter()
                    .filter(|(kind, _)| view.raised.insert(*kind))
                    .collect();
                (pending, view.rate_per_sec)
            })
            .await;

        self.sink
            .increment("migration.rows.read", summary.read_count, job_name);
        self.sink
            .increment("migration.documents.written", summary.written_count, job_name);
        self.sink
            .increment("migration.items.skipped", summary.skipped(), job_name);
        self.sink
            .increment("migration.items.retried", summary.retry_count, job_name);
        self.sink.record_timer(
            "migration.chunk.duration",
            Duration::from_millis(summary.elapsed_ms),
            job_name,
        );
        self.sink.gauge("migration.run.rate", rate, job_name);

        for (kind, message) in pending {
            self.raise(kind, AlertSeverity::Warning, job_name, run_id, message)
                .await;
        }
    }

    async fn on_run_terminal(&self, report: &RunReport) {
        let apply = |view: &mut RunStatusView| {
            let was_active = !view.status.is_terminal();
            view.status = report.status;
            view.stats = report.stats;
            view.ended_at = Some(report.ended_at);
            view.updated_at = report.ended_at;
            if report.error.is_some() {
                view.last_error = report.error.clone();
            }
            view.refresh_rate(report.ended_at);
            was_active
        };

        // Only a run counted by `on_run_started` holds an active slot.
        let was_active = match self
            .registry
            .update_existing(&report.job_name, &report.run_id, apply)
            .await
        {
            Some(was_active) => was_active,
            None => {
                let mut view =
                    RunStatusView::new(&report.run_id, &report.job_name, report.started_at);
                apply(&mut view);
                self.registry.insert(view).await;
                false
            }
        };
        if was_active {
            self.totals.active_runs.fetch_sub(1, Ordering::Relaxed);
        }

        let counter = match report.status {
            RunStatus::Completed => &self.totals.runs_completed,
            RunStatus::Failed => &self.totals.runs_failed,
            _ => &self.totals.runs_stopped,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        self.durations
            .lock()
            .await
            .record(report.duration_ms(), report.stats.documents_written);

        let job_name = report.job_name.as_str();
        self.sink.increment(
            match report.status {
                RunStatus::Completed => "migration.runs.completed",
                RunStatus::Failed => "migration.runs.failed",
                _ => "migration.runs.stopped",
            },
            1,
            job_name,
        );
        self.sink.record_timer(
            "migration.run.duration",
            Duration::from_millis(report.duration_ms()),
            job_name,
        );
        self.sink.gauge(
            "migration.runs.active",
            self.totals.active_runs.load(Ordering::Relaxed) as f64,
            job_name,
        );

        if report.status == RunStatus::Failed {
            let reason = report.error.as_deref().unwrap_or("unknown error");
            self.raise(
                AlertKind::RunFailed,
                AlertSeverity::Critical,
                job_name,
                &report.run_id,
                format!("Run failed: {reason}"),
            )
            .await;
        }

        info!(
            job = %job_name,
            run_id = %report.run_id,
            status = %report.status,
            written = report.stats.documents_written,
            skipped = report.stats.skipped(),
            duration_ms = report.duration_ms(),
            "Run finished"
        );
    }

    async fn raise(
        &self,
        kind: AlertKind,
        severity: AlertSeverity,
        job_name: &str,
        run_id: &str,
        message: String,
    ) {
        let alert = Alert {
            kind,
            severity,
            job_name: job_name.to_string(),
            run_id: run_id.to_string(),
            message,
            raised_at: Utc::now(),
        };
        self.sink.alert(&alert);
        self.alerts.lock().await.push(alert);
    }

    pub async fn status(&self, job_name: &str, run_id: &str) -> Option<RunStatusView> {
        self.registry.get(job_name, run_id).await
    }

    pub async fn active_runs(&self) -> Vec<RunStatusView> {
        self.registry.active().await
    }

    pub async fn alert_history(&self, job_name: &str, last_n: usize) -> Vec<Alert> {
        self.alerts.lock().await.recent(job_name, last_n)
    }

    fn success_rate(&self) -> Option<f64> {
        let completed = self.totals.runs_completed.load(Ordering::Relaxed);
        let failed = self.totals.runs_failed.load(Ordering::Relaxed);
        let finished = completed + failed;
        (finished > 0).then(|| completed as f64 * 100.0 / finished as f64)
    }

    pub async fn statistics(&self) -> MonitorStatistics {
        let durations = *self.durations.lock().await;

        let mut last_24h = WindowStats::default();
        for view in self
            .registry
            .started_since(Utc::now() - ChronoDuration::hours(24))
            .await
        {
            last_24h.runs += 1;
            last_24h.documents_written += view.stats.documents_written;
            match view.status {
                RunStatus::Completed => last_24h.completed += 1,
                RunStatus::Failed => last_24h.failed += 1,
                _ => {}
            }
        }

        let t = &self.totals;
        MonitorStatistics {
            total_runs: t.runs_started.load(Ordering::Relaxed),
            successful_runs: t.runs_completed.load(Ordering::Relaxed),
            failed_runs: t.runs_failed.load(Ordering::Relaxed),
            stopped_runs: t.runs_stopped.load(Ordering::Relaxed),
            active_runs: t.active_runs.load(Ordering::Relaxed),
            success_rate_pct: self.success_rate(),
            records_processed: t.records_processed.load(Ordering::Relaxed),
            error_records: t.error_records.load(Ordering::Relaxed),
            avg_duration_ms: durations.average_ms(),
            max_duration_ms: (durations.count > 0).then_some(durations.max_ms),
            min_duration_ms: (durations.count > 0).then_some(durations.min_ms),
            avg_throughput: durations.throughput(),
            last_24h,
        }
    }

    /// Probes every store and folds the result with the current thresholds.
    pub async fn health(&self) -> HealthReport {
        let probe_timeout = self.config.probe_timeout();
        let probes: Vec<ProbeStatus> = join_all(self.probes.iter().map(|probe| async move {
            let (reachable, error) = match timeout(probe_timeout, probe.probe()).await {
                Ok(Ok(())) => (true, None),
                Ok(Err(e)) => (false, Some(e.to_string())),
                Err(_) => (false, Some(format!("timed out after {probe_timeout:?}"))),
            };
            ProbeStatus {
                name: probe.name().to_string(),
                reachable,
                error,
            }
        }))
        .await;

        let active_alerts = self.active_alerts().await;

        HealthReport {
            level: classify(&probes, &active_alerts),
            checked_at: Utc::now(),
            probes,
            active_runs: self.totals.active_runs.load(Ordering::Relaxed),
            success_rate_pct: self.success_rate(),
            active_alerts,
        }
    }

    /// Thresholds exceeded right now, across active runs and process-wide gauges.
    pub async fn active_alerts(&self) -> Vec<String> {
        let active_runs = self.totals.active_runs.load(Ordering::Relaxed);

        let mut alerts: Vec<String> = self
            .registry
            .active()
            .await
            .iter()
            .flat_map(|view| run_breaches(&self.config, view))
            .map(|(_, message)| message)
            .collect();
        alerts.extend(active_breach(&self.config, active_runs));
        if let Some(rate) = self.success_rate()
            && rate < self.config.min_success_rate_pct
        {
            alerts.push(format!(
                "Success rate {rate:.1}% is below {:.1}%",
                self.config.min_success_rate_pct
            ));
        }
        alerts
    }

    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(Utc::now()).await
    }

    pub async fn evict_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.registry.evict_expired(now).await
    }

    /// Periodically evicts expired run statuses until `cancel` fires.
    pub fn spawn_eviction(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.eviction_interval());
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = monitor.evict_expired().await;
                        if evicted > 0 {
                            debug!(evicted, "Evicted expired run statuses");
                        }
                    }
                }
            }
        })
    }
}

fn run_breaches(config: &MonitorConfig, view: &RunStatusView) -> Vec<(AlertKind, String)> {
    let mut breaches = Vec::new();
    let rate = view.stats.error_rate_pct();

    if view.stats.rows_read > 0 && rate > config.error_rate_threshold_pct {
        breaches.push((
            AlertKind::ErrorRate,
            format!(
                "Run {} of {}: error rate {rate:.2}% exceeds {:.2}%",
                view.run_id, view.job_name, config.error_rate_threshold_pct
            ),
        ));
    }

    let skipped = view.stats.skipped();
    if skipped > config.skip_threshold {
        breaches.push((
            AlertKind::SkipCount,
            format!(
                "Run {} of {}: {skipped} skipped items exceed {}",
                view.run_id, view.job_name, config.skip_threshold
            ),
        ));
    }

    breaches
}

fn active_breach(config: &MonitorConfig, active: u64) -> Option<String> {
    (active > config.active_run_ceiling).then(|| {
        format!(
            "{active} active runs exceed the ceiling of {}",
            config.active_run_ceiling
        )
    })
}

#[async_trait]
impl RunListener for RunMonitor {
    async fn on_event(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted {
                run_id,
                job_name,
                timestamp,
            } => self.on_run_started(run_id, job_name, *timestamp).await,
            RunEvent::ChunkStarted {
                run_id,
                job_name,
                sequence,
                rows,
            } => {
                debug!(job = %job_name, run_id = %run_id, chunk = sequence, rows, "Chunk started");
            }
            RunEvent::ChunkCommitted {
                run_id,
                job_name,
                summary,
            } => self.on_chunk(run_id, job_name, summary, None).await,
            RunEvent::ChunkAborted {
                run_id,
                job_name,
                summary,
                error,
            } => self.on_chunk(run_id, job_name, summary, Some(error)).await,
            RunEvent::RunTerminal { report } => self.on_run_terminal(report).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::health::HealthLevel;
    use connectors::error::ConnectorError;
    use model::execution::run::RunStats;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingSink {
        counters: StdMutex<Vec<(&'static str, u64)>>,
        alerts: StdMutex<Vec<Alert>>,
    }

    impl MetricsSink for RecordingSink {
        fn increment(&self, name: &'static str, value: u64, _job_name: &str) {
            self.counters.lock().unwrap().push((name, value));
        }
        fn record_timer(&self, _name: &'static str, _elapsed: Duration, _job_name: &str) {}
        fn gauge(&self, _name: &'static str, _value: f64, _job_name: &str) {}
        fn alert(&self, alert: &Alert) {
            self.alerts.lock().unwrap().push(alert.clone());
        }
    }

    struct StaticProbe {
        name: &'static str,
        up: bool,
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        fn name(&self) -> &str {
            self.name
        }
        async fn probe(&self) -> Result<(), ConnectorError> {
            if self.up {
                Ok(())
            } else {
                Err(ConnectorError::UnexpectedResult("down".into()))
            }
        }
    }

    fn monitor(config: MonitorConfig) -> (RunMonitor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (RunMonitor::new(config, sink.clone()), sink)
    }

    fn started(run_id: &str) -> RunEvent {
        RunEvent::RunStarted {
            run_id: run_id.into(),
            job_name: "orders".into(),
            timestamp: Utc::now(),
        }
    }

    fn committed(run_id: &str, read: u64, skipped: u64) -> RunEvent {
        RunEvent::ChunkCommitted {
            run_id: run_id.into(),
            job_name: "orders".into(),
            summary: ChunkSummary {
                read_count: read,
                processed_count: read - skipped,
                written_count: read - skipped,
                process_skips: skipped,
                ..Default::default()
            },
        }
    }

    fn terminal(run_id: &str, status: RunStatus) -> RunEvent {
        RunEvent::RunTerminal {
            report: RunReport {
                run_id: run_id.into(),
                job_name: "orders".into(),
                status,
                stats: RunStats {
                    rows_read: 100,
                    documents_written: 100,
                    ..Default::default()
                },
                started_at: Utc::now() - ChronoDuration::seconds(2),
                ended_at: Utc::now(),
                error: (status == RunStatus::Failed).then(|| "skip limit exceeded".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn skip_threshold_alerts_once_per_run() {
        let (monitor, sink) = monitor(MonitorConfig {
            skip_threshold: 5,
            error_rate_threshold_pct: 100.0,
            ..Default::default()
        });

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&committed("r1", 100, 4)).await;
        assert!(monitor.alert_history("orders", 10).await.is_empty());

        monitor.on_event(&committed("r1", 100, 4)).await;
        monitor.on_event(&committed("r1", 100, 4)).await;

        let alerts = monitor.alert_history("orders", 10).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::SkipCount);
        assert_eq!(sink.alerts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn error_rate_is_measured_over_the_run() {
        let (monitor, _) = monitor(MonitorConfig {
            error_rate_threshold_pct: 5.0,
            ..Default::default()
        });

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&committed("r1", 100, 4)).await;
        assert!(monitor.alert_history("orders", 10).await.is_empty());

        // 4 + 8 of 200 = 6%
        monitor.on_event(&committed("r1", 100, 8)).await;
        let alerts = monitor.alert_history("orders", 10).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ErrorRate);
    }

    #[tokio::test]
    async fn active_run_ceiling_alerts() {
        let (monitor, _) = monitor(MonitorConfig {
            active_run_ceiling: 1,
            ..Default::default()
        });

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&started("r2")).await;
        monitor.on_event(&committed("r2", 10, 0)).await;

        let alerts = monitor.alert_history("orders", 10).await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::ActiveRuns);

        let health = monitor.health().await;
        assert_eq!(health.level, HealthLevel::Warning);
        assert_eq!(health.active_runs, 2);
    }

    #[tokio::test]
    async fn terminal_runs_update_statistics() {
        let (monitor, sink) = monitor(MonitorConfig::default());

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&committed("r1", 100, 0)).await;
        monitor.on_event(&terminal("r1", RunStatus::Completed)).await;
        monitor.on_event(&started("r2")).await;
        monitor.on_event(&terminal("r2", RunStatus::Failed)).await;

        let stats = monitor.statistics().await;
        assert_eq!(stats.total_runs, 2);
        assert_eq!(stats.successful_runs, 1);
        assert_eq!(stats.failed_runs, 1);
        assert_eq!(stats.active_runs, 0);
        assert_eq!(stats.records_processed, 100);
        assert_eq!(stats.success_rate_pct, Some(50.0));
        assert_eq!(stats.last_24h.runs, 2);
        assert!(stats.avg_duration_ms.unwrap() >= 1_000);

        let alerts = monitor.alert_history("orders", 10).await;
        assert_eq!(alerts.last().unwrap().kind, AlertKind::RunFailed);
        assert_eq!(alerts.last().unwrap().severity, AlertSeverity::Critical);

        let counters = sink.counters.lock().unwrap();
        assert!(counters.contains(&("migration.runs.failed", 1)));
        assert!(counters.contains(&("migration.documents.written", 100)));
    }

    #[tokio::test]
    async fn only_started_runs_release_an_active_slot() {
        let (monitor, _) = monitor(MonitorConfig::default());

        monitor.on_event(&terminal("ghost", RunStatus::Completed)).await;
        assert_eq!(monitor.statistics().await.active_runs, 0);
        let view = monitor.status("orders", "ghost").await.unwrap();
        assert_eq!(view.status, RunStatus::Completed);

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&started("r2")).await;
        monitor.on_event(&terminal("r1", RunStatus::Stopped)).await;
        monitor.on_event(&terminal("r1", RunStatus::Stopped)).await;
        assert_eq!(monitor.statistics().await.active_runs, 1);
    }

    #[tokio::test]
    async fn unreachable_probe_forces_critical() {
        let (monitor, _) = monitor(MonitorConfig::default());
        let monitor = monitor.with_probes(vec![
            Arc::new(StaticProbe { name: "postgres", up: true }),
            Arc::new(StaticProbe { name: "mongodb", up: false }),
        ]);

        let health = monitor.health().await;
        assert_eq!(health.level, HealthLevel::Critical);
        assert!(!health.probes[1].reachable);
    }

    #[tokio::test]
    async fn low_success_rate_warns() {
        let (monitor, _) = monitor(MonitorConfig::default());
        let monitor =
            monitor.with_probes(vec![Arc::new(StaticProbe { name: "postgres", up: true })]);

        let health = monitor.health().await;
        assert_eq!(health.level, HealthLevel::Healthy);

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&terminal("r1", RunStatus::Failed)).await;
        let health = monitor.health().await;
        assert_eq!(health.level, HealthLevel::Warning);
        assert_eq!(health.active_alerts, vec!["Success rate 0.0% is below 80.0%"]);
    }

    #[tokio::test]
    async fn finished_runs_are_evicted_after_retention() {
        let (monitor, _) = monitor(MonitorConfig::default());

        monitor.on_event(&started("r1")).await;
        monitor.on_event(&terminal("r1", RunStatus::Completed)).await;
        monitor.on_event(&started("r2")).await;

        let later = Utc::now() + ChronoDuration::hours(25);
        assert_eq!(monitor.evict_expired_at(later).await, 1);
        assert!(monitor.status("orders", "r1").await.is_none());
        assert!(monitor.status("orders", "r2").await.is_some());
    }
}
