//! Approval API surface (§4.K): control operations over the Post Store +
//! Job Queue Client. HTTP verbs are incidental and out of scope — these are
//! plain async functions a front-end (not part of this crate) would call.

use std::sync::Arc;

use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::gate::GateController;
use crate::models::{CurrentStage, GateMode, StageStatus};
use crate::queue::{Job, JobQueueClient, RUN_PIPELINE_STAGE};
use crate::registry::Stage;
use crate::store::PostStore;

pub struct ApprovalApi {
    pub post_store: Arc<dyn PostStore>,
    pub job_queue: Arc<dyn JobQueueClient>,
}

fn stage_job(post_id: Uuid, stage: Option<Stage>) -> Job {
    let mut args = serde_json::json!({ "post_id": post_id.to_string() });
    if let Some(stage) = stage {
        args["stage"] = serde_json::Value::String(stage.as_str().to_string());
    }
    Job::new(RUN_PIPELINE_STAGE, args)
}

impl ApprovalApi {
    /// Reset to the first stage and enqueue a full run.
    pub async fn start_pipeline(&self, post_id: Uuid) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;
        let first = Stage::first();
        post.current_stage = CurrentStage::Stage(first);
        post.stage_status.insert(first, StageStatus::Running);
        self.post_store.save(&post).await?;
        self.enqueue(stage_job(post_id, None)).await
    }

    /// Set every non-complete stage to `auto` and enqueue a full run.
    pub async fn run_all(&self, post_id: Uuid) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;
        for stage in crate::registry::STAGES {
            if post.status_of(stage) != Some(StageStatus::Complete) {
                post.stage_settings.insert(stage, GateMode::Auto);
            }
        }
        self.post_store.save(&post).await?;
        self.enqueue(stage_job(post_id, None)).await
    }

    /// Force a single stage to re-run, regardless of its current status.
    pub async fn rerun_stage(&self, post_id: Uuid, stage: Stage) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;
        post.stage_status.insert(stage, StageStatus::Running);
        post.current_stage = CurrentStage::Stage(stage);
        self.post_store.save(&post).await?;
        self.enqueue(stage_job(post_id, Some(stage))).await
    }

    /// Approve a stage awaiting review, optionally overwriting its content
    /// (§4.G), and enqueue the continuation.
    pub async fn approve(&self, post_id: Uuid, stage: Stage, overwrite_content: Option<String>) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;
        GateController::approve(&mut post, stage, overwrite_content)?;
        self.post_store.save(&post).await?;
        if post.current_stage != CurrentStage::Complete {
            self.enqueue(stage_job(post_id, None)).await?;
        }
        Ok(())
    }

    /// Pause a post. Does not pre-empt an in-flight stage (§4.K, §5).
    pub async fn pause(&self, post_id: Uuid) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;
        post.current_stage = CurrentStage::Paused;
        self.post_store.save(&post).await?;
        Ok(())
    }

    /// Retry a dead-lettered entry: pop it, clear the error, and enqueue a
    /// fresh single-stage run for its stage.
    pub async fn retry_dead_letter(&self, post_id: Uuid) -> EngineResult<()> {
        let entry = self
            .job_queue
            .pop_dead_letter(post_id)
            .await
            .map_err(|e| EngineError::Queue(e.to_string()))?
            .ok_or(EngineError::DeadLetterEntryNotFound(post_id))?;

        let mut post = self.post_store.get(post_id).await?;
        post.error = None;
        post.current_stage = CurrentStage::Pending;
        self.post_store.save(&post).await?;

        self.enqueue(stage_job(post_id, entry.stage)).await
    }

    async fn enqueue(&self, job: Job) -> EngineResult<()> {
        self.job_queue.enqueue(job).await.map_err(|e| EngineError::Queue(e.to_string()))
    }
}
