use crate::{execution::run::RunReport, records::chunk::ChunkSummary};
use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// A trait for events that can be published on the EventBus.
pub trait Event: Send + Sync + Debug + 'static {
    /// Returns a unique identifier for this event type.
    fn event_type(&self) -> &'static str;
}

/// Lifecycle events emitted by the chunk executor for one run.
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        run_id: String,
        job_name: String,
        timestamp: DateTime<Utc>,
    },
    ChunkStarted {
        run_id: String,
        job_name: String,
        sequence: u64,
        rows: u64,
    },
    ChunkCommitted {
        run_id: String,
        job_name: String,
        summary: ChunkSummary,
    },
    ChunkAborted {
        run_id: String,
        job_name: String,
        summary: ChunkSummary,
        error: String,
    },
    RunTerminal {
        report: RunReport,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> &str {
        match self {
            RunEvent::RunStarted { run_id, .. }
            | RunEvent::ChunkStarted { run_id, .. }
            | RunEvent::ChunkCommitted { run_id, .. }
            | RunEvent::ChunkAborted { run_id, .. } => run_id,
            RunEvent::RunTerminal { report } => &report.run_id,
        }
    }

    pub fn job_name(&self) -> &str {
        match self {
            RunEvent::RunStarted { job_name, .. }
            | RunEvent::ChunkStarted { job_name, .. }
            | RunEvent::ChunkCommitted { job_name, .. }
            | RunEvent::ChunkAborted { job_name, .. } => job_name,
            RunEvent::RunTerminal { report } => &report.job_name,
        }
    }
}

impl Event for RunEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run.started",
            RunEvent::ChunkStarted { .. } => "chunk.started",
            RunEvent::ChunkCommitted { .. } => "chunk.committed",
            RunEvent::ChunkAborted { .. } => "chunk.aborted",
            RunEvent::RunTerminal { .. } => "run.terminal",
        }
    }
}
