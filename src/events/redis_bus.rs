//! Redis-backed Event Bus for multi-process deployments.
//!
//! `PUBLISH`es to channel names `post:<id>` / `global` (§6 wire format),
//! selected the same way the teacher crate selects its `redis-backend`
//! feature-gated rate limiter (see `rate_limit::redis`).

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::{post_channel, Event, EventBus, EventBusError, EventResult, EventSubscription, GLOBAL_CHANNEL};

pub struct RedisEventBus {
    conn: ConnectionManager,
    client: redis::Client,
}

impl RedisEventBus {
    pub async fn new(redis_url: &str) -> EventResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| EventBusError::Backend(format!("redis connection error: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| EventBusError::Backend(format!("redis connection manager error: {e}")))?;
        Ok(Self { conn, client })
    }

    async fn publish_to(&self, channel: &str, event: &Event) -> EventResult<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(channel, event.to_wire())
            .await
            .map_err(|e| EventBusError::Backend(e.to_string()))
    }
}

struct PubSubSubscription {
    stream: std::pin::Pin<Box<dyn futures::Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl EventSubscription for PubSubSubscription {
    async fn recv(&mut self) -> Option<Event> {
        loop {
            let msg = self.stream.next().await?;
            let payload: Vec<u8> = msg.get_payload().ok()?;
            if let Ok(event) = serde_json::from_slice::<Event>(&payload) {
                return Some(event);
            }
        }
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    async fn publish(&self, event: Event) -> EventResult<()> {
        let channel = post_channel(event.post_id);
        self.publish_to(&channel, &event).await?;
        self.publish_to(GLOBAL_CHANNEL, &event).await
    }

    async fn subscribe_post(&self, post_id: Uuid) -> EventResult<Box<dyn EventSubscription>> {
        self.subscribe_channel(&post_channel(post_id)).await
    }

    async fn subscribe_global(&self) -> EventResult<Box<dyn EventSubscription>> {
        self.subscribe_channel(GLOBAL_CHANNEL).await
    }
}

impl RedisEventBus {
    async fn subscribe_channel(&self, channel: &str) -> EventResult<Box<dyn EventSubscription>> {
        let pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| EventBusError::Backend(e.to_string()))?;
        let mut pubsub = pubsub;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| EventBusError::Backend(e.to_string()))?;
        let stream = Box::pin(pubsub.into_on_message());
        Ok(Box::new(PubSubSubscription { stream }))
    }
}
