use chrono::{DateTime, Utc};
use model::execution::run::{RunReport, RunStats, RunStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Persisted history entry for one run.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub job_name: String,
    /// Deduplicating token derived from the submission.
    pub token: String,
    pub params: BTreeMap<String, String>,
    pub status: RunStatus,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn started(
        run_id: &str,
        job_name: &str,
        token: &str,
        params: BTreeMap<String, String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_name: job_name.to_string(),
            token: token.to_string(),
            params,
            status: RunStatus::Starting,
            stats: RunStats::default(),
            started_at,
            updated_at: started_at,
            ended_at: None,
            error: None,
        }
    }

    pub fn apply_report(&mut self, report: &RunReport) {
        self.status = report.status;
        self.stats = report.stats;
        self.ended_at = Some(report.ended_at);
        self.updated_at = report.ended_at;
        self.error = report.error.clone();
    }

    pub fn from_report(report: &RunReport) -> Self {
        let mut record = Self::started(
            &report.run_id,
            &report.job_name,
            "",
            BTreeMap::new(),
            report.started_at,
        );
        record.apply_report(report);
        record
    }
}
