use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Thresholds and retention for the run monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Skipped items as a percentage of rows read.
    pub error_rate_threshold_pct: f64,
    /// Absolute skipped-item count per run.
    pub skip_threshold: u64,
    /// Concurrently active runs, process-wide.
    pub active_run_ceiling: u64,
    /// Alerts kept per job name.
    pub alert_history_size: usize,
    /// How long finished runs stay queryable.
    pub retention_secs: u64,
    pub eviction_interval_secs: u64,
    /// Finished-run success rate below which health degrades to WARNING.
    pub min_success_rate_pct: f64,
    pub probe_timeout_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            error_rate_threshold_pct: 5.0,
            skip_threshold: 100,
            active_run_ceiling: 10,
            alert_history_size: 100,
            retention_secs: 24 * 60 * 60,
            eviction_interval_secs: 5 * 60,
            min_success_rate_pct: 80.0,
            probe_timeout_ms: 5_000,
        }
    }
}

impl MonitorConfig {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs.min(i64::MAX as u64) as i64)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs.max(1))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
