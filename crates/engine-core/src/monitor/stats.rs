use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub runs: u64,
    pub completed: u64,
    pub failed: u64,
    pub documents_written: u64,
}

/// Process-wide snapshot of everything the monitor has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MonitorStatistics {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub stopped_runs: u64,
    pub active_runs: u64,
    pub success_rate_pct: Option<f64>,
    pub records_processed: u64,
    pub error_records: u64,
    pub avg_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub min_duration_ms: Option<u64>,
    /// Documents written per second of finished-run wall time.
    pub avg_throughput: Option<f64>,
    pub last_24h: WindowStats,
}

/// Running aggregate of finished-run durations.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DurationStats {
    pub count: u64,
    pub total_ms: u64,
    pub max_ms: u64,
    pub min_ms: u64,
    pub documents: u64,
}

impl DurationStats {
    pub fn record(&mut self, duration_ms: u64, documents: u64) {
        self.min_ms = if self.count == 0 {
            duration_ms
        } else {
            self.min_ms.min(duration_ms)
        };
        self.max_ms = self.max_ms.max(duration_ms);
        self.total_ms += duration_ms;
        self.documents += documents;
        self.count += 1;
    }

    pub fn average_ms(&self) -> Option<u64> {
        (self.count > 0).then(|| self.total_ms / self.count)
    }

    pub fn throughput(&self) -> Option<f64> {
        (self.total_ms > 0).then(|| self.documents as f64 * 1000.0 / self.total_ms as f64)
    }
}
