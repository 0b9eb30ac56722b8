//! Redis-backed Job Queue Client for multi-process deployments.
//!
//! Ready jobs live in a list (`queue:jobs`); delayed retries live in a
//! sorted set (`queue:delayed`) scored by ready-at epoch millis and are
//! atomically drained into the list with a Lua script before each claim,
//! the same atomic-operation style as the teacher's `rate_limit::redis`
//! backend. Dead letters are a flat list (`queue:deadletter`).

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use uuid::Uuid;

use super::{Job, JobQueueClient, QueueError, QueueResult};
use crate::models::DeadLetterEntry;

const JOBS_KEY: &str = "postforge:queue:jobs";
const DELAYED_KEY: &str = "postforge:queue:delayed";
const DEADLETTER_KEY: &str = "postforge:queue:deadletter";

pub struct RedisJobQueue {
    conn: ConnectionManager,
}

impl RedisJobQueue {
    pub async fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::Backend(format!("redis connection error: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::Backend(format!("redis connection manager error: {e}")))?;
        Ok(Self { conn })
    }

    /// Move every delayed job whose ready-at has passed into the ready list.
    async fn drain_due(&self) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let script = Script::new(
            r#"
            local delayed_key = KEYS[1]
            local jobs_key = KEYS[2]
            local now = tonumber(ARGV[1])
            local due = redis.call('ZRANGEBYSCORE', delayed_key, '-inf', now)
            for _, member in ipairs(due) do
                redis.call('ZREM', delayed_key, member)
                redis.call('LPUSH', jobs_key, member)
            end
            return #due
        "#,
        );
        let now_ms = chrono::Utc::now().timestamp_millis();
        let _: i64 = script
            .key(DELAYED_KEY)
            .key(JOBS_KEY)
            .arg(now_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl JobQueueClient for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&job).map_err(|e| QueueError::Backend(e.to_string()))?;
        conn.lpush::<_, _, ()>(JOBS_KEY, payload)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn claim(&self) -> QueueResult<Option<Job>> {
        self.drain_due().await?;
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .rpop(JOBS_KEY, None)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        match payload {
            Some(p) => Ok(Some(
                serde_json::from_str(&p).map_err(|e| QueueError::Backend(e.to_string()))?,
            )),
            None => Ok(None),
        }
    }

    async fn retry_after(&self, mut job: Job, delay: Duration) -> QueueResult<()> {
        job.job_try += 1;
        let ready_at_ms = chrono::Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let payload = serde_json::to_string(&job).map_err(|e| QueueError::Backend(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(DELAYED_KEY, payload, ready_at_ms)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn push_dead_letter(&self, entry: DeadLetterEntry) -> QueueResult<()> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(&entry).map_err(|e| QueueError::Backend(e.to_string()))?;
        conn.lpush::<_, _, ()>(DEADLETTER_KEY, payload)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))
    }

    async fn list_dead_letters(&self) -> QueueResult<Vec<DeadLetterEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(DEADLETTER_KEY, 0, -1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;
        raw.iter()
            .map(|s| serde_json::from_str(s).map_err(|e| QueueError::Backend(e.to_string())))
            .collect()
    }

    async fn pop_dead_letter(&self, post_id: Uuid) -> QueueResult<Option<DeadLetterEntry>> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(DEADLETTER_KEY, 0, -1)
            .await
            .map_err(|e| QueueError::Backend(e.to_string()))?;

        for entry_raw in raw {
            let entry: DeadLetterEntry =
                serde_json::from_str(&entry_raw).map_err(|e| QueueError::Backend(e.to_string()))?;
            if entry.post_id == post_id {
                conn.lrem::<_, _, ()>(DEADLETTER_KEY, 1, entry_raw)
                    .await
                    .map_err(|e| QueueError::Backend(e.to_string()))?;
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }
}
