//! Event Bus (§4.A): publish/subscribe progress events on two channel
//! families — `post:<id>` and `global` — with no replay and no ordering
//! guarantee across channels.
//!
//! Two backends implement the same `EventBus` trait, mirroring the teacher
//! crate's pluggable rate-limit backend: an in-process broadcast-channel bus
//! (default, used in tests) and a Redis pub/sub bus for multi-process
//! deployments, selected behind the `redis-backend` feature.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_bus;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::InMemoryEventBus;
#[cfg(feature = "redis-backend")]
pub use redis_bus::RedisEventBus;

/// Errors from Event Bus operations.
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("event bus backend error: {0}")]
    Backend(String),
}

pub type EventResult<T> = std::result::Result<T, EventBusError>;

/// Event taxonomy (§4.A); at minimum these are emitted by the runner and
/// crawl worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StageStart,
    StageReview,
    StageComplete,
    StageError,
    PipelineComplete,
    Log,
    ImageGenerated,
    ImageFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageStart => "stage_start",
            Self::StageReview => "stage_review",
            Self::StageComplete => "stage_complete",
            Self::StageError => "stage_error",
            Self::PipelineComplete => "pipeline_complete",
            Self::Log => "log",
            Self::ImageGenerated => "image_generated",
            Self::ImageFailed => "image_failed",
        }
    }
}

/// One published record: `{event, post_id, timestamp, ...payload}` (§6 wire
/// format), with `payload` flattened into the top-level JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event: EventKind,
    pub post_id: Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(flatten)]
    pub payload: serde_json::Value,
}

impl Event {
    pub fn new(event: EventKind, post_id: Uuid, payload: serde_json::Value) -> Self {
        Self {
            event,
            post_id,
            timestamp: chrono::Utc::now(),
            payload,
        }
    }

    /// Serialize to the UTF-8 JSON bytes published on the wire (§6).
    pub fn to_wire(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Event always serializes")
    }
}

fn post_channel(post_id: Uuid) -> String {
    format!("post:{post_id}")
}

const GLOBAL_CHANNEL: &str = "global";

/// A subscription handle yielding events as they are published. Best-effort:
/// a slow subscriber may miss events (§4.A).
#[async_trait]
pub trait EventSubscription: Send {
    async fn recv(&mut self) -> Option<Event>;
}

/// Publish/subscribe bus for progress events. `publish` writes an identical
/// record to both the per-post channel and `global`.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: Event) -> EventResult<()>;

    async fn subscribe_post(
        &self,
        post_id: Uuid,
    ) -> EventResult<Box<dyn EventSubscription>>;

    async fn subscribe_global(&self) -> EventResult<Box<dyn EventSubscription>>;
}
