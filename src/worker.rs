//! Worker-pool loop (§5): claim a job, dispatch it, and act on the
//! `RunOutcome` it settles with. Mirrors the teacher crate's
//! `DownloadService` claim→process→report worker shape, but against the
//! Job Queue Client instead of a crawl-URL table.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use postforge::crawl::CrawlWorker;
use postforge::models::DeadLetterEntry;
use postforge::queue::{Job, JobQueueClient, RUN_CRAWL_PROFILE, RUN_PIPELINE_STAGE};
use postforge::registry::Stage;
use postforge::runner::{PipelineRunner, RunOutcome};

/// Claim jobs until the queue is empty (checked twice, with a short pause in
/// between, before giving up — same double-check the teacher's download
/// worker uses to tolerate a momentarily-empty queue).
pub async fn run_worker_loop(
    worker_id: usize,
    queue: Arc<dyn JobQueueClient>,
    runner: Arc<PipelineRunner>,
    crawl_worker: Arc<CrawlWorker>,
    job_timeout: Duration,
    retry_delay: Duration,
) {
    loop {
        let job = match queue.claim().await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                match queue.claim().await {
                    Ok(Some(job)) => job,
                    _ => break,
                }
            }
            Err(e) => {
                warn!(worker_id, error = %e, "claim failed, retrying");
                tokio::time::sleep(Duration::from_millis(500)).await;
                continue;
            }
        };

        process_job(worker_id, &queue, &runner, &crawl_worker, job, job_timeout, retry_delay).await;
    }
}

async fn process_job(
    worker_id: usize,
    queue: &Arc<dyn JobQueueClient>,
    runner: &Arc<PipelineRunner>,
    crawl_worker: &Arc<CrawlWorker>,
    job: Job,
    job_timeout: Duration,
    retry_delay: Duration,
) {
    let Some(post_id) = job.post_id() else {
        match job.fn_name.as_str() {
            RUN_CRAWL_PROFILE => {
                run_crawl(crawl_worker, &job, job_timeout).await;
            }
            other => error!(worker_id, fn_name = other, "job carries no post_id and no profile_id"),
        }
        return;
    };

    let stage = job
        .args
        .get("stage")
        .and_then(|v| v.as_str())
        .and_then(Stage::from_str);

    if job.fn_name != RUN_PIPELINE_STAGE {
        error!(worker_id, fn_name = %job.fn_name, "unknown job kind");
        return;
    }

    let runner = runner.clone();
    let job_try = job.job_try;
    let outcome = tokio::time::timeout(job_timeout, async {
        match stage {
            Some(stage) => runner.run_single_stage(post_id, stage, job_try).await,
            None => runner.run_full_pipeline(post_id, job_try).await,
        }
    })
    .await;

    match outcome {
        Ok(Ok(RunOutcome::Settled)) => {
            info!(worker_id, %post_id, "job settled");
        }
        Ok(Ok(RunOutcome::Retry)) => {
            if let Err(e) = queue.retry_after(job, retry_delay).await {
                error!(worker_id, %post_id, error = %e, "failed to requeue retry");
            }
        }
        Ok(Ok(RunOutcome::DeadLettered(entry))) => {
            if let Err(e) = queue.push_dead_letter(entry).await {
                error!(worker_id, %post_id, error = %e, "failed to push dead letter");
            }
        }
        Ok(Err(e)) => {
            error!(worker_id, %post_id, error = %e, "job failed with a non-retryable engine error");
        }
        Err(_elapsed) => {
            warn!(worker_id, %post_id, "job timed out");
            timed_out(queue, job, post_id, stage, retry_delay, runner.max_attempts).await;
        }
    }
}

/// A wall-clock timeout counts as a transient failure against the same
/// attempt budget a stage failure would (§5 Cancellation).
async fn timed_out(
    queue: &Arc<dyn JobQueueClient>,
    job: Job,
    post_id: uuid::Uuid,
    stage: Option<Stage>,
    retry_delay: Duration,
    max_attempts: u32,
) {
    if job.job_try >= max_attempts {
        let entry = DeadLetterEntry {
            post_id,
            stage,
            error: "job timed out".to_string(),
            attempts: job.job_try,
            failed_at: chrono::Utc::now(),
        };
        let _ = queue.push_dead_letter(entry).await;
    } else {
        let _ = queue.retry_after(job, retry_delay).await;
    }
}

async fn run_crawl(crawl_worker: &Arc<CrawlWorker>, job: &Job, job_timeout: Duration) {
    let Some(profile_id) = job
        .args
        .get("profile_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<uuid::Uuid>().ok())
    else {
        error!("crawl job missing a valid profile_id");
        return;
    };

    match tokio::time::timeout(job_timeout, crawl_worker.crawl(profile_id)).await {
        Ok(Ok(())) => info!(%profile_id, "crawl settled"),
        Ok(Err(e)) => error!(%profile_id, error = %e, "crawl failed"),
        Err(_) => warn!(%profile_id, "crawl timed out"),
    }
}
