//! In-process Event Bus backed by `tokio::sync::broadcast` channels.
//!
//! Mirrors the teacher crate's `InMemoryRateLimitBackend`: an `Arc<RwLock<HashMap<..>>>`
//! of lazily-created per-key channels guarded by a read-then-upgrade-to-write
//! lookup, plus one fixed channel (here, `global`) created at construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::{post_channel, Event, EventBus, EventResult, EventSubscription, GLOBAL_CHANNEL};

const CHANNEL_CAPACITY: usize = 256;

/// In-process, single-engine-instance Event Bus. Default backend, used in
/// tests and single-process deployments.
#[derive(Clone)]
pub struct InMemoryEventBus {
    post_channels: Arc<RwLock<HashMap<String, broadcast::Sender<Event>>>>,
    global: broadcast::Sender<Event>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        let (global, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            post_channels: Arc::new(RwLock::new(HashMap::new())),
            global,
        }
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<Event> {
        if let Some(sender) = self.post_channels.read().await.get(channel) {
            return sender.clone();
        }
        let mut channels = self.post_channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

struct BroadcastSubscription(broadcast::Receiver<Event>);

#[async_trait]
impl EventSubscription for BroadcastSubscription {
    async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.0.recv().await {
                Ok(event) => return Some(event),
                // A subscriber that falls behind may miss events (§4.A);
                // skip the gap rather than treat it as a fatal error.
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: Event) -> EventResult<()> {
        let channel = post_channel(event.post_id);
        let post_sender = self.sender_for(&channel).await;
        // No subscribers is not an error: the bus is fire-and-forget.
        let _ = post_sender.send(event.clone());
        let _ = self.global.send(event);
        Ok(())
    }

    async fn subscribe_post(&self, post_id: Uuid) -> EventResult<Box<dyn EventSubscription>> {
        let channel = post_channel(post_id);
        let sender = self.sender_for(&channel).await;
        Ok(Box::new(BroadcastSubscription(sender.subscribe())))
    }

    async fn subscribe_global(&self) -> EventResult<Box<dyn EventSubscription>> {
        let _ = GLOBAL_CHANNEL;
        Ok(Box::new(BroadcastSubscription(self.global.subscribe())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn post_subscriber_receives_published_event() {
        let bus = InMemoryEventBus::new();
        let post_id = Uuid::new_v4();
        let mut sub = bus.subscribe_post(post_id).await.unwrap();

        bus.publish(Event::new(EventKind::StageStart, post_id, serde_json::json!({"stage": "research"})))
            .await
            .unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.event, EventKind::StageStart);
        assert_eq!(event.post_id, post_id);
    }

    #[tokio::test]
    async fn global_subscriber_receives_every_post_event() {
        let bus = InMemoryEventBus::new();
        let mut global_sub = bus.subscribe_global().await.unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        bus.publish(Event::new(EventKind::Log, a, serde_json::json!({}))).await.unwrap();
        bus.publish(Event::new(EventKind::Log, b, serde_json::json!({}))).await.unwrap();

        let first = global_sub.recv().await.unwrap();
        let second = global_sub.recv().await.unwrap();
        assert_eq!(first.post_id, a);
        assert_eq!(second.post_id, b);
    }

    #[tokio::test]
    async fn subscriber_for_unrelated_post_does_not_receive() {
        let bus = InMemoryEventBus::new();
        let watched = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut sub = bus.subscribe_post(watched).await.unwrap();

        bus.publish(Event::new(EventKind::Log, other, serde_json::json!({}))).await.unwrap();
        bus.publish(Event::new(EventKind::Log, watched, serde_json::json!({}))).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.post_id, watched);
    }
}
