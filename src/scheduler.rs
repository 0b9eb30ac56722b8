//! Scheduler (§4.J): a daily cron tick that enqueues crawl jobs for
//! profiles due for a recrawl.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::EngineResult;
use crate::queue::{Job, JobQueueClient, RUN_CRAWL_PROFILE};
use crate::store::ProfileStore;

pub struct Scheduler {
    pub profile_store: Arc<dyn ProfileStore>,
    pub job_queue: Arc<dyn JobQueueClient>,
}

impl Scheduler {
    /// Run one tick: enqueue a crawl job for every profile `Profile::recrawl_due`
    /// reports as due. No backpressure — the queue handles concurrency (§5).
    pub async fn tick(&self) -> EngineResult<usize> {
        let now = Utc::now();
        let profiles = self.profile_store.list().await?;
        let mut enqueued = 0;

        for profile in profiles {
            if profile.recrawl_due(now) {
                let args = serde_json::json!({ "profile_id": profile.id.to_string() });
                self.job_queue
                    .enqueue(Job::new(RUN_CRAWL_PROFILE, args))
                    .await
                    .map_err(|e| crate::error::EngineError::Queue(e.to_string()))?;
                enqueued += 1;
                info!(profile_id = %profile.id, "enqueued recrawl");
            }
        }

        Ok(enqueued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlStatus, Profile, RecrawlInterval};
    use crate::queue::InMemoryJobQueue;
    use crate::store::{Db, SqliteProfileStore};

    #[tokio::test]
    async fn tick_enqueues_only_due_profiles() {
        let db = Db::open_in_memory().unwrap();
        db.init_schema().unwrap();
        let profile_store: Arc<dyn ProfileStore> = Arc::new(SqliteProfileStore::new(db));
        let job_queue: Arc<dyn JobQueueClient> = Arc::new(InMemoryJobQueue::new());

        let mut due = Profile::new("due", "https://due.example.com");
        due.recrawl_interval = RecrawlInterval::Weekly;
        due.crawl_status = CrawlStatus::Complete;
        due.last_crawled_at = Some(Utc::now() - chrono::Duration::days(8));
        profile_store.create(&due).await.unwrap();

        let mut not_due = Profile::new("not-due", "https://notdue.example.com");
        not_due.recrawl_interval = RecrawlInterval::Weekly;
        not_due.crawl_status = CrawlStatus::Complete;
        not_due.last_crawled_at = Some(Utc::now() - chrono::Duration::days(1));
        profile_store.create(&not_due).await.unwrap();

        let disabled = Profile::new("disabled", "https://disabled.example.com");
        profile_store.create(&disabled).await.unwrap();

        let scheduler = Scheduler { profile_store, job_queue: job_queue.clone() };
        let enqueued = scheduler.tick().await.unwrap();
        assert_eq!(enqueued, 1);

        let job = job_queue.claim().await.unwrap().unwrap();
        assert_eq!(job.fn_name, RUN_CRAWL_PROFILE);
        assert_eq!(job.args["profile_id"], due.id.to_string());
        assert!(job_queue.claim().await.unwrap().is_none());
    }
}
