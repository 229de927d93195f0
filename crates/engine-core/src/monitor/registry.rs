use crate::monitor::alert::AlertKind;
use chrono::{DateTime, Duration, Utc};
use model::execution::run::{RunStats, RunStatus};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

/// Live view of one run as seen by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatusView {
    pub run_id: String,
    pub job_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub stats: RunStats,
    /// Skipped items plus aborted chunks.
    pub errors: u64,
    /// Documents written per second since the run started.
    pub rate_per_sec: f64,
    pub last_error: Option<String>,
    #[serde(skip)]
    pub(crate) raised: HashSet<AlertKind>,
}

impl RunStatusView {
    pub fn new(run_id: &str, job_name: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.to_string(),
            job_name: job_name.to_string(),
            status: RunStatus::Running,
            started_at,
            updated_at: started_at,
            ended_at: None,
            stats: RunStats::default(),
            errors: 0,
            rate_per_sec: 0.0,
            last_error: None,
            raised: HashSet::new(),
        }
    }

    pub fn refresh_rate(&mut self, now: DateTime<Utc>) {
        let elapsed_ms = (now - self.started_at).num_milliseconds();
        self.rate_per_sec = if elapsed_ms > 0 {
            self.stats.documents_written as f64 * 1000.0 / elapsed_ms as f64
        } else {
            0.0
        };
    }
}

type RunKey = (String, String);

/// Process-wide run status map with time-based eviction of finished runs.
#[derive(Debug)]
pub struct StatusRegistry {
    runs: RwLock<HashMap<RunKey, RunStatusView>>,
    retention: Duration,
}

impl StatusRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            retention,
        }
    }

    fn key(job_name: &str, run_id: &str) -> RunKey {
        (job_name.to_string(), run_id.to_string())
    }

    pub async fn insert(&self, view: RunStatusView) {
        let key = Self::key(&view.job_name, &view.run_id);
        self.runs.write().await.insert(key, view);
    }

    /// Applies `f` to the run's view only if it is already registered.
    pub async fn update_existing<R>(
        &self,
        job_name: &str,
        run_id: &str,
        f: impl FnOnce(&mut RunStatusView) -> R,
    ) -> Option<R> {
        self.runs
            .write()
            .await
            .get_mut(&Self::key(job_name, run_id))
            .map(f)
    }

    /// Applies `f` to the run's view, creating it first if the start was never seen.
    pub async fn update<R>(
        &self,
        job_name: &str,
        run_id: &str,
        f: impl FnOnce(&mut RunStatusView) -> R,
    ) -> R {
        let mut runs = self.runs.write().await;
        let view = runs
            .entry(Self::key(job_name, run_id))
            .or_insert_with(|| RunStatusView::new(run_id, job_name, Utc::now()));
        f(view)
    }

    pub async fn get(&self, job_name: &str, run_id: &str) -> Option<RunStatusView> {
        self.runs
            .read()
            .await
            .get(&Self::key(job_name, run_id))
            .cloned()
    }

    pub async fn active(&self) -> Vec<RunStatusView> {
        let mut active: Vec<_> = self
            .runs
            .read()
            .await
            .values()
            .filter(|v| !v.status.is_terminal())
            .cloned()
            .collect();
        active.sort_by_key(|v| v.started_at);
        active
    }

    pub async fn started_since(&self, cutoff: DateTime<Utc>) -> Vec<RunStatusView> {
        self.runs
            .read()
            .await
            .values()
            .filter(|v| v.started_at >= cutoff)
            .cloned()
            .collect()
    }

    /// Removes finished runs that ended before `now - retention`. Active runs are never evicted.
    pub async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.retention;
        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, view| match view.ended_at {
            Some(ended) if view.status.is_terminal() => ended >= cutoff,
            _ => true,
        });
        before - runs.len()
    }

    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }
}
