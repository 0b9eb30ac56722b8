//! Pipeline Runner (§4.H): the heart of the engine. Loops over the Stage
//! Registry, consults the Gate Controller, calls the Stage Executor,
//! persists output, emits events, and reports retry/dead-letter decisions
//! back to the caller, which owns the Job Queue Client (mirroring the
//! teacher's worker loop: claim, process, report).

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::events::{Event, EventBus, EventKind};
use crate::executor::{StageExecutor, StageOutput, StateSnapshot};
use crate::gate::{GateController, GateDecision};
use crate::models::{DeadLetterEntry, ErrorRecord, LogLevel, Post, StageLog, StageStatus};
use crate::registry::{Stage, STAGES};
use crate::sink;
use crate::store::{LinkStore, PostStore, ProfileStore};

/// Outcome of a run, distinguishing what the caller (the worker loop, which
/// owns the Job Queue Client) must do next.
pub enum RunOutcome {
    /// Ran to completion or paused for review/approval. Nothing further.
    Settled,
    /// A stage failed with attempts remaining; re-enqueue after the
    /// configured retry delay.
    Retry,
    /// A stage exhausted its retry budget; push this entry to the DLQ.
    DeadLettered(DeadLetterEntry),
}

pub struct PipelineRunner {
    pub post_store: Arc<dyn PostStore>,
    pub link_store: Arc<dyn LinkStore>,
    pub profile_store: Arc<dyn ProfileStore>,
    pub executor: Arc<StageExecutor>,
    pub event_bus: Arc<dyn EventBus>,
    pub rules_dir: std::path::PathBuf,
    pub max_attempts: u32,
}

impl PipelineRunner {
    /// Full-pipeline run (§4.H mode 1): iterate the registry in order,
    /// skipping already-complete stages, consulting the Gate Controller at
    /// each one.
    pub async fn run_full_pipeline(&self, post_id: Uuid, job_try: u32) -> EngineResult<RunOutcome> {
        for stage in STAGES {
            let mut post = self.post_store.get(post_id).await?;

            if post.status_of(stage) == Some(StageStatus::Complete) {
                continue;
            }

            match GateController::decide(&mut post, stage) {
                GateDecision::Proceed => {}
                GateDecision::PauseForReview | GateDecision::PauseForApproval => {
                    self.post_store.save(&post).await?;
                    self.publish(Event::new(EventKind::StageReview, post_id, serde_json::json!({ "stage": stage.as_str() })))
                        .await?;
                    return Ok(RunOutcome::Settled);
                }
            }

            match self.run_stage(&mut post, stage, job_try).await? {
                RunOutcome::Settled => {}
                other => return Ok(other),
            }
        }

        self.run_completion_hook(post_id).await?;
        Ok(RunOutcome::Settled)
    }

    /// Single-stage run (§4.H mode 2, `rerun-stage`): no gate check, force
    /// exactly `stage` regardless of its current status. If this was the
    /// last incomplete stage, promotes the post to `current_stage = Complete`
    /// the same way `run_full_pipeline` does on its final iteration.
    pub async fn run_single_stage(&self, post_id: Uuid, stage: Stage, job_try: u32) -> EngineResult<RunOutcome> {
        let mut post = self.post_store.get(post_id).await?;
        let outcome = self.run_stage(&mut post, stage, job_try).await?;

        if let RunOutcome::Settled = outcome {
            let post = self.post_store.get(post_id).await?;
            if STAGES.iter().all(|s| post.status_of(*s) == Some(StageStatus::Complete)) {
                self.run_completion_hook(post_id).await?;
            }
        }

        Ok(outcome)
    }

    async fn run_stage(&self, post: &mut Post, stage: Stage, job_try: u32) -> EngineResult<RunOutcome> {
        let post_id = post.id;
        let snapshot = self.build_snapshot(post, stage).await?;

        post.current_stage = crate::models::CurrentStage::Stage(stage);
        post.stage_status.insert(stage, StageStatus::Running);
        self.post_store.save(post).await?;
        self.publish(Event::new(EventKind::StageStart, post_id, serde_json::json!({ "stage": stage.as_str() })))
            .await?;

        let bus = self.event_bus.clone();
        let run_result = sink::with_sink(bus, post_id, self.executor.execute(stage, &snapshot)).await;

        match run_result {
            Ok((output, meta)) => {
                self.apply_stage_output(post, stage, output);
                post.stage_logs.insert(
                    stage,
                    StageLog {
                        model: meta.model,
                        tokens_in: meta.tokens_in,
                        tokens_out: meta.tokens_out,
                        duration_s: meta.duration_s,
                        cost_usd: meta.cost_usd,
                    },
                );
                // §7 item 5: a malformed images manifest is not fatal — the
                // stage is marked failed but the pipeline proceeds.
                if stage == Stage::Images && manifest_has_error(post) {
                    post.stage_status.insert(stage, StageStatus::Failed);
                } else {
                    post.stage_status.insert(stage, StageStatus::Complete);
                }
                post.append_log(Some(stage), LogLevel::Info, "stage_complete", format!("{stage} complete"), serde_json::json!({}));
                self.post_store.save(post).await?;
                self.publish(Event::new(EventKind::StageComplete, post_id, serde_json::json!({ "stage": stage.as_str() })))
                    .await?;
                Ok(RunOutcome::Settled)
            }
            Err(stage_error) => self.handle_stage_failure(post, stage, job_try, stage_error).await,
        }
    }

    async fn handle_stage_failure(
        &self,
        post: &mut Post,
        stage: Stage,
        job_try: u32,
        stage_error: crate::error::StageError,
    ) -> EngineResult<RunOutcome> {
        let post_id = post.id;
        self.publish(Event::new(
            EventKind::StageError,
            post_id,
            serde_json::json!({ "stage": stage.as_str(), "error": stage_error.message(), "attempt": job_try }),
        ))
        .await?;

        if job_try < self.max_attempts {
            post.append_log(
                Some(stage),
                LogLevel::Warning,
                "retry",
                format!("attempt {job_try} failed: {}", stage_error.message()),
                serde_json::json!({ "attempt": job_try }),
            );
            self.post_store.save(post).await?;
            warn!(stage = %stage, attempt = job_try, "stage failed, will retry");
            return Ok(RunOutcome::Retry);
        }

        error!(stage = %stage, attempt = job_try, "stage exhausted retries, dead-lettering");
        let failed_at = Utc::now();
        let message = stage_error.message().to_string();
        post.append_log(
            Some(stage),
            LogLevel::Error,
            "stage_error",
            format!("dead-lettered after {job_try} attempts: {message}"),
            serde_json::json!({ "attempt": job_try }),
        );
        post.error = Some(ErrorRecord { message: message.clone(), attempts: job_try, failed_at });
        post.current_stage = crate::models::CurrentStage::Failed;
        self.post_store.save(post).await?;

        Ok(RunOutcome::DeadLettered(DeadLetterEntry {
            post_id,
            stage: Some(stage),
            error: message,
            attempts: job_try,
            failed_at,
        }))
    }

    async fn build_snapshot(&self, post: &Post, stage: Stage) -> EngineResult<StateSnapshot> {
        let internal_links = match post.profile_id {
            Some(profile_id) => self.link_store.by_profile(profile_id).await?,
            None => Vec::new(),
        };
        let rules = crate::rules::load_rules(&self.rules_dir, stage);
        Ok(StateSnapshot {
            post_id: post.id,
            slug: post.slug.clone(),
            config: post.config.clone(),
            prior_outputs: post.content.clone(),
            internal_links,
            rules,
        })
    }

    fn apply_stage_output(&self, post: &mut Post, stage: Stage, output: StageOutput) {
        match (stage, output) {
            (Stage::Research, StageOutput::Text(t)) => post.content.research_content = Some(t),
            (Stage::Outline, StageOutput::Text(t)) => post.content.outline_content = Some(t),
            (Stage::Write, StageOutput::Text(t)) => post.content.draft_content = Some(t),
            (Stage::Ready, StageOutput::Text(t)) => post.content.ready_content = Some(t),
            (Stage::Edit, StageOutput::EditOutput { final_md, final_html }) => {
                post.content.final_md_content = Some(final_md);
                post.content.final_html_content = final_html;
            }
            (Stage::Images, StageOutput::ImageManifest(v)) => post.content.image_manifest = Some(v),
            (stage, _) => warn!(stage = %stage, "stage produced an output shape that doesn't match its registry slot"),
        }
    }

    /// §4.H completion hook: derive the canonical URL, register a generated
    /// Link unless one already exists for it, mark the post complete.
    async fn run_completion_hook(&self, post_id: Uuid) -> EngineResult<()> {
        let mut post = self.post_store.get(post_id).await?;

        if let Some(profile_id) = post.profile_id {
            let profile = self.profile_store.get(profile_id).await?;
            let canonical_url = profile.canonical_url_for_slug(&post.slug);
            if !self.link_store.exists(profile_id, &canonical_url).await? {
                let mut link = crate::models::Link::new(profile_id, canonical_url, crate::models::LinkSource::Generated);
                link.slug = Some(post.slug.clone());
                link.generated_by_post_id = Some(post_id);
                self.link_store.insert_if_absent(&link).await?;
            }
        }

        post.current_stage = crate::models::CurrentStage::Complete;
        post.completed_at = Some(Utc::now());
        self.post_store.save(&post).await?;
        self.publish(Event::new(EventKind::PipelineComplete, post_id, serde_json::json!({}))).await?;
        info!(post_id = %post_id, "pipeline complete");
        Ok(())
    }

    async fn publish(&self, event: Event) -> EngineResult<()> {
        self.event_bus.publish(event).await.map_err(|e| EngineError::Queue(e.to_string()))
    }
}

fn manifest_has_error(post: &Post) -> bool {
    post.content
        .image_manifest
        .as_ref()
        .and_then(|v| v.get("error"))
        .map(|e| !e.is_null())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::StageError;
    use crate::events::InMemoryEventBus;
    use crate::executor::{StageFn, StageRunResult};
    use crate::models::{GateMode, OutputFormat, PostConfig};
    use crate::store::{Db, SqliteLinkStore, SqlitePostStore, SqliteProfileStore};

    fn config() -> PostConfig {
        PostConfig {
            topic: "Best keyboards".to_string(),
            audience: String::new(),
            tone: String::new(),
            target_word_count: 0,
            output_format: OutputFormat::Markdown,
            related_keywords: vec![],
            image_style: String::new(),
            image_colors: vec![],
            image_exclusions: vec![],
            required_mentions: vec![],
            avoid: vec![],
            competitor_urls: vec![],
            profile_id: None,
        }
    }

    struct AlwaysSucceeds;

    #[async_trait]
    impl StageFn for AlwaysSucceeds {
        async fn run(&self, _snapshot: &StateSnapshot) -> Result<StageRunResult, StageError> {
            Ok(StageRunResult {
                output: StageOutput::Text("ok".to_string()),
                model: "m".to_string(),
                tokens_in: 10,
                tokens_out: 10,
            })
        }
    }

    struct FailsThenSucceeds {
        calls: AtomicU32,
    }

    #[async_trait]
    impl StageFn for FailsThenSucceeds {
        async fn run(&self, _snapshot: &StateSnapshot) -> Result<StageRunResult, StageError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(StageError::Transient("flaky".to_string()));
            }
            Ok(StageRunResult {
                output: StageOutput::Text("ok".to_string()),
                model: "m".to_string(),
                tokens_in: 0,
                tokens_out: 0,
            })
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl StageFn for AlwaysFails {
        async fn run(&self, _snapshot: &StateSnapshot) -> Result<StageRunResult, StageError> {
            Err(StageError::Permanent("nope".to_string()))
        }
    }

    fn build(executor: StageExecutor, max_attempts: u32) -> (PipelineRunner, Db) {
        let db = Db::open_in_memory().unwrap();
        db.init_schema().unwrap();
        let runner = PipelineRunner {
            post_store: Arc::new(SqlitePostStore::new(db.clone())),
            link_store: Arc::new(SqliteLinkStore::new(db.clone())),
            profile_store: Arc::new(SqliteProfileStore::new(db.clone())),
            executor: Arc::new(executor),
            event_bus: Arc::new(InMemoryEventBus::new()),
            rules_dir: tempfile::tempdir().unwrap().keep(),
            max_attempts,
        };
        (runner, db)
    }

    fn auto_post() -> Post {
        let mut post = Post::new("s1", config());
        for stage in STAGES {
            post.stage_settings.insert(stage, GateMode::Auto);
        }
        post
    }

    #[tokio::test]
    async fn all_auto_pipeline_runs_to_completion() {
        let mut executor = StageExecutor::new();
        for stage in STAGES {
            executor.register(stage, Box::new(AlwaysSucceeds));
        }
        let (runner, _db) = build(executor, 3);

        let post = auto_post();
        runner.post_store.create(&post).await.unwrap();

        matches!(runner.run_full_pipeline(post.id, 1).await.unwrap(), RunOutcome::Settled);

        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.current_stage, crate::models::CurrentStage::Complete);
        assert!(loaded.completed_at.is_some());
        for stage in STAGES {
            assert_eq!(loaded.status_of(stage), Some(StageStatus::Complete));
        }
    }

    #[tokio::test]
    async fn review_mode_pauses_before_running_that_stage() {
        let mut executor = StageExecutor::new();
        for stage in STAGES {
            executor.register(stage, Box::new(AlwaysSucceeds));
        }
        let (runner, _db) = build(executor, 3);

        let mut post = auto_post();
        post.stage_settings.insert(Stage::Outline, GateMode::Review);
        runner.post_store.create(&post).await.unwrap();

        matches!(runner.run_full_pipeline(post.id, 1).await.unwrap(), RunOutcome::Settled);

        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.status_of(Stage::Research), Some(StageStatus::Complete));
        assert_eq!(loaded.status_of(Stage::Outline), Some(StageStatus::Review));
        assert_eq!(loaded.status_of(Stage::Write), None);
        assert_eq!(loaded.current_stage, crate::models::CurrentStage::Stage(Stage::Outline));
    }

    #[tokio::test]
    async fn transient_failure_within_budget_yields_retry() {
        let mut executor = StageExecutor::new();
        executor.register(Stage::Research, Box::new(FailsThenSucceeds { calls: AtomicU32::new(0) }));
        for stage in STAGES.into_iter().skip(1) {
            executor.register(stage, Box::new(AlwaysSucceeds));
        }
        let (runner, _db) = build(executor, 3);

        let post = auto_post();
        runner.post_store.create(&post).await.unwrap();

        match runner.run_full_pipeline(post.id, 1).await.unwrap() {
            RunOutcome::Retry => {}
            _ => panic!("expected a retry outcome"),
        }
        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.status_of(Stage::Research), Some(StageStatus::Running));

        match runner.run_full_pipeline(post.id, 2).await.unwrap() {
            RunOutcome::Retry => panic!("should have succeeded on second attempt"),
            _ => {}
        }
    }

    #[tokio::test]
    async fn failure_exhausting_attempts_is_dead_lettered() {
        let mut executor = StageExecutor::new();
        executor.register(Stage::Research, Box::new(AlwaysFails));
        let (runner, _db) = build(executor, 2);

        let post = auto_post();
        runner.post_store.create(&post).await.unwrap();

        match runner.run_full_pipeline(post.id, 2).await.unwrap() {
            RunOutcome::DeadLettered(entry) => {
                assert_eq!(entry.post_id, post.id);
                assert_eq!(entry.stage, Some(Stage::Research));
                assert_eq!(entry.attempts, 2);
            }
            _ => panic!("expected dead-letter outcome"),
        }
        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.current_stage, crate::models::CurrentStage::Failed);
        assert!(loaded.error.is_some());
    }

    #[tokio::test]
    async fn completion_hook_registers_generated_link() {
        let mut executor = StageExecutor::new();
        for stage in STAGES {
            executor.register(stage, Box::new(AlwaysSucceeds));
        }
        let (runner, _db) = build(executor, 3);

        let profile = crate::models::Profile::new("acme", "https://acme.example.com");
        runner.profile_store.create(&profile).await.unwrap();

        let mut config = config();
        config.profile_id = Some(profile.id);
        let mut post = Post::new("my-post", config);
        post.profile_id = Some(profile.id);
        for stage in STAGES {
            post.stage_settings.insert(stage, GateMode::Auto);
        }
        runner.post_store.create(&post).await.unwrap();

        runner.run_full_pipeline(post.id, 1).await.unwrap();

        let links = runner.link_store.by_profile(profile.id).await.unwrap();
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].url, "https://acme.example.com/my-post/");
        assert_eq!(links[0].source, crate::models::LinkSource::Generated);
    }

    #[tokio::test]
    async fn single_stage_run_completes_pipeline_when_it_was_the_last_stage() {
        let mut executor = StageExecutor::new();
        for stage in STAGES {
            executor.register(stage, Box::new(AlwaysSucceeds));
        }
        let (runner, _db) = build(executor, 3);

        let mut post = auto_post();
        for stage in STAGES.into_iter().filter(|s| *s != Stage::Ready) {
            post.stage_status.insert(stage, StageStatus::Complete);
        }
        runner.post_store.create(&post).await.unwrap();

        runner.run_single_stage(post.id, Stage::Ready, 1).await.unwrap();

        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.current_stage, crate::models::CurrentStage::Complete);
        assert!(loaded.completed_at.is_some());
    }

    #[tokio::test]
    async fn rerun_stage_ignores_gate_and_current_completion() {
        let mut executor = StageExecutor::new();
        executor.register(Stage::Outline, Box::new(AlwaysSucceeds));
        let (runner, _db) = build(executor, 3);

        let mut post = auto_post();
        post.stage_status.insert(Stage::Outline, StageStatus::Complete);
        post.stage_settings.insert(Stage::Outline, GateMode::Review);
        runner.post_store.create(&post).await.unwrap();

        runner.run_single_stage(post.id, Stage::Outline, 1).await.unwrap();

        let loaded = runner.post_store.get(post.id).await.unwrap();
        assert_eq!(loaded.status_of(Stage::Outline), Some(StageStatus::Complete));
        assert_eq!(loaded.content.outline_content.as_deref(), Some("ok"));
    }
}
