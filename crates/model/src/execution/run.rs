use crate::records::chunk::ChunkSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Starting => "STARTING",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative counters across every chunk of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub rows_read: u64,
    pub documents_processed: u64,
    pub documents_written: u64,
    pub process_skips: u64,
    pub write_skips: u64,
    pub retries: u64,
    pub chunks_committed: u64,
    pub chunks_aborted: u64,
}

impl RunStats {
    pub fn record_chunk(&mut self, chunk: &ChunkSummary, committed: bool) {
        self.rows_read += chunk.read_count;
        self.documents_processed += chunk.processed_count;
        self.documents_written += chunk.written_count;
        self.process_skips += chunk.process_skips;
        self.write_skips += chunk.write_skips;
        self.retries += chunk.retry_count;
        if committed {
            self.chunks_committed += 1;
        } else {
            self.chunks_aborted += 1;
        }
    }

    pub fn skipped(&self) -> u64 {
        self.process_skips + self.write_skips
    }

    pub fn chunks(&self) -> u64 {
        self.chunks_committed + self.chunks_aborted
    }

    /// Skipped items as a percentage of rows read.
    pub fn error_rate_pct(&self) -> f64 {
        if self.rows_read == 0 {
            return 0.0;
        }
        self.skipped() as f64 * 100.0 / self.rows_read as f64
    }
}

/// What a run reports once it is over: status, last error and counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub job_name: String,
    pub status: RunStatus,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl RunReport {
    pub fn duration_ms(&self) -> u64 {
        (self.ended_at - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Documents written per second of wall time.
    pub fn throughput(&self) -> f64 {
        let ms = self.duration_ms();
        if ms == 0 {
            return self.stats.documents_written as f64;
        }
        self.stats.documents_written as f64 * 1000.0 / ms as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_chunks() {
        let mut stats = RunStats::default();
        let chunk = ChunkSummary {
            sequence: 0,
            read_count: 1000,
            processed_count: 998,
            written_count: 997,
            process_skips: 2,
            write_skips: 1,
            retry_count: 4,
            elapsed_ms: 10,
        };

        stats.record_chunk(&chunk, true);
        stats.record_chunk(&ChunkSummary::default(), false);

        assert_eq!(stats.rows_read, 1000);
        assert_eq!(stats.skipped(), 3);
        assert_eq!(stats.chunks_committed, 1);
        assert_eq!(stats.chunks_aborted, 1);
        assert!((stats.error_rate_pct() - 0.3).abs() < 1e-9);
    }
}
