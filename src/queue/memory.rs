//! In-process Job Queue Client backed by a `VecDeque`, guarded the same way
//! the teacher's `InMemoryRateLimitBackend` guards its domain map.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Job, JobQueueClient, QueueResult};
use crate::models::DeadLetterEntry;

#[derive(Clone)]
pub struct InMemoryJobQueue {
    jobs: Arc<RwLock<VecDeque<Job>>>,
    dead_letters: Arc<RwLock<Vec<DeadLetterEntry>>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(VecDeque::new())),
            dead_letters: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobQueueClient for InMemoryJobQueue {
    async fn enqueue(&self, job: Job) -> QueueResult<()> {
        self.jobs.write().await.push_back(job);
        Ok(())
    }

    async fn claim(&self) -> QueueResult<Option<Job>> {
        Ok(self.jobs.write().await.pop_front())
    }

    async fn retry_after(&self, mut job: Job, delay: Duration) -> QueueResult<()> {
        job.job_try += 1;
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            jobs.write().await.push_back(job);
        });
        Ok(())
    }

    async fn push_dead_letter(&self, entry: DeadLetterEntry) -> QueueResult<()> {
        self.dead_letters.write().await.push(entry);
        Ok(())
    }

    async fn list_dead_letters(&self) -> QueueResult<Vec<DeadLetterEntry>> {
        Ok(self.dead_letters.read().await.clone())
    }

    async fn pop_dead_letter(&self, post_id: Uuid) -> QueueResult<Option<DeadLetterEntry>> {
        let mut entries = self.dead_letters.write().await;
        let index = entries.iter().position(|e| e.post_id == post_id);
        Ok(index.map(|i| entries.remove(i)))
    }
}
