use crate::monitor::alert::{Alert, AlertSeverity};
use std::time::Duration;
use tracing::{error, info, warn};

/// Append-only outlet for metrics and alerts.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &'static str, value: u64, job_name: &str);

    fn record_timer(&self, name: &'static str, elapsed: Duration, job_name: &str);

    fn gauge(&self, name: &'static str, value: f64, job_name: &str);

    fn alert(&self, alert: &Alert);
}

/// Emits every record as a structured event on the `metrics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn increment(&self, name: &'static str, value: u64, job_name: &str) {
        info!(target: "metrics", metric = name, kind = "counter", value, job = job_name);
    }

    fn record_timer(&self, name: &'static str, elapsed: Duration, job_name: &str) {
        info!(
            target: "metrics",
            metric = name,
            kind = "timer",
            duration_ms = elapsed.as_millis() as u64,
            job = job_name
        );
    }

    fn gauge(&self, name: &'static str, value: f64, job_name: &str) {
        info!(target: "metrics", metric = name, kind = "gauge", value, job = job_name);
    }

    fn alert(&self, alert: &Alert) {
        match alert.severity {
            AlertSeverity::Warning => warn!(
                target: "metrics",
                kind = ?alert.kind,
                job = %alert.job_name,
                run_id = %alert.run_id,
                "{}", alert.message
            ),
            AlertSeverity::Critical => error!(
                target: "metrics",
                kind = ?alert.kind,
                job = %alert.job_name,
                run_id = %alert.run_id,
                "{}", alert.message
            ),
        }
    }
}
