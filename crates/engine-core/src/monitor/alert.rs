use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertKind {
    ErrorRate,
    SkipCount,
    ActiveRuns,
    RunFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub job_name: String,
    pub run_id: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Most-recent-N alerts per job name.
#[derive(Debug)]
pub struct AlertHistory {
    capacity: usize,
    per_job: HashMap<String, VecDeque<Alert>>,
}

impl AlertHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            per_job: HashMap::new(),
        }
    }

    pub fn push(&mut self, alert: Alert) {
        let entries = self.per_job.entry(alert.job_name.clone()).or_default();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(alert);
    }

    /// Up to `last_n` alerts for `job_name`, oldest first.
    pub fn recent(&self, job_name: &str, last_n: usize) -> Vec<Alert> {
        self.per_job
            .get(job_name)
            .map(|entries| {
                let skip = entries.len().saturating_sub(last_n);
                entries.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self, job_name: &str) -> usize {
        self.per_job.get(job_name).map_or(0, VecDeque::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(job: &str, n: usize) -> Alert {
        Alert {
            kind: AlertKind::SkipCount,
            severity: AlertSeverity::Warning,
            job_name: job.into(),
            run_id: format!("run-{n}"),
            message: format!("alert {n}"),
            raised_at: Utc::now(),
        }
    }

    #[test]
    fn history_is_bounded_per_job() {
        let mut history = AlertHistory::new(3);
        for n in 0..5 {
            history.push(alert("orders", n));
        }
        history.push(alert("invoices", 0));

        assert_eq!(history.len("orders"), 3);
        assert_eq!(history.len("invoices"), 1);

        let recent: Vec<_> = history
            .recent("orders", 2)
            .into_iter()
            .map(|a| a.run_id)
            .collect();
        assert_eq!(recent, vec!["run-3", "run-4"]);
    }
}
