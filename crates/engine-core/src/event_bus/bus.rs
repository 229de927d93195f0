use model::events::Event;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::Arc,
};
use tokio::sync::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// A subscription handle that can be used to unsubscribe from events.
#[derive(Debug, Clone)]
pub struct Subscription {
    event_type_id: TypeId,
    subscriber_id: u64,
}

/// Typed fan-out of events to subscriber channels.
///
/// Delivery awaits channel capacity: a slow subscriber applies backpressure to the
/// publisher instead of losing events, since run accounting depends on every event.
#[derive(Clone, Default)]
pub struct EventBus {
    // Event TypeId -> (subscriber id -> Sender<Arc<E>>)
    subscribers: Arc<RwLock<HashMap<TypeId, HashMap<u64, Box<dyn Any + Send + Sync>>>>>,
    next_id: Arc<RwLock<u64>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe<E>(&self, sender: mpsc::Sender<Arc<E>>) -> Subscription
    where
        E: Event + Clone,
    {
        let event_type_id = TypeId::of::<E>();

        let subscriber_id = {
            let mut id_lock = self.next_id.write().await;
            let id = *id_lock;
            *id_lock += 1;
            id
        };

        self.subscribers
            .write()
            .await
            .entry(event_type_id)
            .or_default()
            .insert(subscriber_id, Box::new(sender));

        debug!(
            event_type = std::any::type_name::<E>(),
            subscriber_id, "Subscribed to event"
        );

        Subscription {
            event_type_id,
            subscriber_id,
        }
    }

    pub async fn publish<E>(&self, event: E)
    where
        E: Event + Clone,
    {
        let event_arc = Arc::new(event);

        // Clone the senders out so no lock is held while awaiting capacity.
        let senders: Vec<(u64, mpsc::Sender<Arc<E>>)> = {
            let subscribers = self.subscribers.read().await;
            let Some(type_subscribers) = subscribers.get(&TypeId::of::<E>()) else {
                debug!(event = event_arc.event_type(), "No subscribers for event");
                return;
            };

            type_subscribers
                .iter()
                .filter_map(|(id, boxed)| {
                    let sender = boxed.downcast_ref::<mpsc::Sender<Arc<E>>>();
                    if sender.is_none() {
                        warn!(subscriber_id = id, "Failed to downcast sender for subscriber");
                    }
                    sender.map(|s| (*id, s.clone()))
                })
                .collect()
        };

        for (subscriber_id, sender) in senders {
            if sender.send(event_arc.clone()).await.is_err() {
                warn!(
                    event = event_arc.event_type(),
                    subscriber_id, "Subscriber channel closed, event not delivered"
                );
            }
        }
    }

    /// Drops the subscriber's sender; its receiver drains what was queued and then ends.
    pub async fn unsubscribe(&self, subscription: Subscription) {
        let mut subscribers = self.subscribers.write().await;

        if let Some(type_subscribers) = subscribers.get_mut(&subscription.event_type_id) {
            type_subscribers.remove(&subscription.subscriber_id);
            debug!(
                subscriber_id = subscription.subscriber_id,
                "Unsubscribed from event"
            );

            if type_subscribers.is_empty() {
                subscribers.remove(&subscription.event_type_id);
            }
        }
    }

    pub async fn subscriber_count<E>(&self) -> usize
    where
        E: Event,
    {
        self.subscribers
            .read()
            .await
            .get(&TypeId::of::<E>())
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}
