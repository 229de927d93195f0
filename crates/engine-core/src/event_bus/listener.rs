use crate::event_bus::bus::{EventBus, Subscription};
use async_trait::async_trait;
use model::events::RunEvent;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::debug;

/// Consumer of run lifecycle events.
#[async_trait]
pub trait RunListener: Send + Sync {
    async fn on_event(&self, event: &RunEvent);
}

/// A listener task attached to a bus. Detaching waits until every queued event is handled.
pub struct AttachedListener {
    subscription: Subscription,
    task: JoinHandle<()>,
}

impl AttachedListener {
    pub async fn attach(bus: &EventBus, listener: Arc<dyn RunListener>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Arc<RunEvent>>(capacity.max(1));
        let subscription = bus.subscribe(tx).await;

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                listener.on_event(&event).await;
            }
            debug!("Run listener drained");
        });

        Self { subscription, task }
    }

    pub async fn detach(self, bus: &EventBus) {
        bus.unsubscribe(self.subscription).await;
        // A panicking listener must not take the run down with it.
        let _ = self.task.await;
    }
}
