use crate::{event_bus::listener::RunListener, state::RunStore};
use async_trait::async_trait;
use model::events::{Event, RunEvent};
use std::sync::Arc;
use tracing::warn;

/// Mirrors chunk progress and terminal state into the run store.
pub struct StoreListener {
    store: Arc<dyn RunStore>,
}

impl StoreListener {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RunListener for StoreListener {
    async fn on_event(&self, event: &RunEvent) {
        let result = match event {
            RunEvent::ChunkCommitted {
                run_id,
                job_name,
                summary,
            } => {
                self.store
                    .record_run_progress(job_name, run_id, summary, true)
                    .await
            }
            RunEvent::ChunkAborted {
                run_id,
                job_name,
                summary,
                ..
            } => {
                self.store
                    .record_run_progress(job_name, run_id, summary, false)
                    .await
            }
            RunEvent::RunTerminal { report } => self.store.record_run_end(report).await,
            // Start is recorded by the runtime before the run is spawned.
            RunEvent::RunStarted { .. } | RunEvent::ChunkStarted { .. } => Ok(()),
        };

        if let Err(error) = result {
            warn!(
                run_id = %event.run_id(),
                event = event.event_type(),
                %error,
                "Failed to record run state"
            );
        }
    }
}
