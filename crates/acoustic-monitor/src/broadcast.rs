//! Event fan-out to connected subscribers.

use std::collections::HashMap;
use std::future::Future;

use acoustic_core::{FieldSnapshot, MonitorEvent};
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, info};
use uuid::Uuid;

/// A connected subscriber's end of the event stream.
///
/// The first event received is always [`MonitorEvent::FullSnapshot`].
pub struct Subscription {
    id: Uuid,
    rx: UnboundedReceiver<MonitorEvent>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `None` once the broadcaster has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<MonitorEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<MonitorEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

#[derive(Default)]
pub struct Broadcaster {
    subscribers: RwLock<HashMap<Uuid, UnboundedSender<MonitorEvent>>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber and hands it a full snapshot first.
    ///
    /// The subscriber table stays write-locked while the snapshot is built, so
    /// no event published in between can reach the subscriber ahead of it.
    pub async fn connect<F, Fut>(&self, snapshot: F) -> Subscription
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FieldSnapshot>,
    {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut subscribers = self.subscribers.write().await;
        let _ = tx.send(MonitorEvent::FullSnapshot(snapshot().await));
        subscribers.insert(id, tx);
        info!(subscriber_id = %id, subscribers = subscribers.len(), "subscriber connected");

        Subscription { id, rx }
    }

    pub async fn disconnect(&self, id: Uuid) {
        if self.subscribers.write().await.remove(&id).is_some() {
            info!(subscriber_id = %id, "subscriber disconnected");
        }
    }

    /// Best-effort, at-most-once delivery to whoever is connected right now.
    /// Subscribers whose receiving end is gone are pruned.
    pub async fn publish(&self, event: MonitorEvent) {
        let event_type = event.event_type();
        let closed: Vec<Uuid> = {
            let subscribers = self.subscribers.read().await;
            debug!(event_type, subscribers = subscribers.len(), "publishing event");
            subscribers
                .iter()
                .filter(|(_, tx)| tx.send(event.clone()).is_err())
                .map(|(id, _)| *id)
                .collect()
        };

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            for id in closed {
                subscribers.remove(&id);
                debug!(subscriber_id = %id, "pruned closed subscriber");
            }
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}
