use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthLevel::Healthy => "HEALTHY",
            HealthLevel::Warning => "WARNING",
            HealthLevel::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatus {
    pub name: String,
    pub reachable: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub level: HealthLevel,
    pub checked_at: DateTime<Utc>,
    pub probes: Vec<ProbeStatus>,
    pub active_runs: u64,
    /// `None` until at least one run has finished.
    pub success_rate_pct: Option<f64>,
    /// Thresholds currently exceeded, in plain words.
    pub active_alerts: Vec<String>,
}

/// Unreachable stores force CRITICAL; any breached threshold degrades to WARNING.
pub fn classify(probes: &[ProbeStatus], breaches: &[String]) -> HealthLevel {
    if probes.iter().any(|p| !p.reachable) {
        HealthLevel::Critical
    } else if !breaches.is_empty() {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    }
}
