//! Job Queue Client (§4.B): enqueue named jobs with arguments onto a
//! persistent, at-least-once-delivery queue, plus the Dead-Letter Queue
//! (§6) that holds jobs which exhausted their retries.
//!
//! Same pluggable-backend shape as the Event Bus: an in-memory queue
//! (default, used in tests) and a Redis-backed queue for multi-process
//! deployments, selected behind the `redis-backend` feature.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis_queue;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub use memory::InMemoryJobQueue;
#[cfg(feature = "redis-backend")]
pub use redis_queue::RedisJobQueue;

use crate::models::DeadLetterEntry;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job queue backend error: {0}")]
    Backend(String),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;

pub const RUN_PIPELINE_STAGE: &str = "run_pipeline_stage";
pub const RUN_CRAWL_PROFILE: &str = "run_crawl_profile";

/// A claimed job: `(ctx, *args)` where `ctx` includes `job_try`, the
/// 1-indexed attempt number (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub fn_name: String,
    pub args: serde_json::Value,
    pub job_try: u32,
}

impl Job {
    pub fn new(fn_name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            fn_name: fn_name.into(),
            args,
            job_try: 1,
        }
    }

    /// Read a `post_id` field out of `args`, the convention every job kind
    /// in this engine uses.
    pub fn post_id(&self) -> Option<Uuid> {
        self.args.get("post_id")?.as_str()?.parse().ok()
    }
}

/// At-least-once delivery queue plus dead-letter storage.
#[async_trait]
pub trait JobQueueClient: Send + Sync {
    async fn enqueue(&self, job: Job) -> QueueResult<()>;

    /// Claim the next job, if any, without blocking.
    async fn claim(&self) -> QueueResult<Option<Job>>;

    /// Re-enqueue `job` with `job_try` incremented by one, after `delay`
    /// (§5 fixed retry delay).
    async fn retry_after(&self, job: Job, delay: Duration) -> QueueResult<()>;

    async fn push_dead_letter(&self, entry: DeadLetterEntry) -> QueueResult<()>;

    async fn list_dead_letters(&self) -> QueueResult<Vec<DeadLetterEntry>>;

    /// Pop the dead-letter entry for `post_id`, if present (§4.E retry-dead-letter).
    async fn pop_dead_letter(&self, post_id: Uuid) -> QueueResult<Option<DeadLetterEntry>>;
}
