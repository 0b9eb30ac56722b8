//! End-to-end scenarios exercising the Pipeline Runner and Gate Controller
//! together through the crate's public API, against an in-memory SQLite
//! store and event bus — no teacher-specific wiring, just the engine as an
//! external caller would assemble it.

use std::sync::Arc;

use async_trait::async_trait;

use postforge::error::StageError;
use postforge::events::InMemoryEventBus;
use postforge::executor::{StageExecutor, StageFn, StageOutput, StateSnapshot, StageRunResult};
use postforge::gate::GateController;
use postforge::models::{CurrentStage, GateMode, OutputFormat, Post, PostConfig, StageStatus};
use postforge::registry::{Stage, STAGES};
use postforge::runner::{PipelineRunner, RunOutcome};
use postforge::store::{Db, SqliteLinkStore, SqlitePostStore, SqliteProfileStore};

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

fn build(max_attempts: u32) -> PipelineRunner {
    let mut executor = StageExecutor::new();
    for stage in STAGES {
        executor.register(stage, Box::new(AlwaysSucceeds));
    }

    let db = Db::open_in_memory().unwrap();
    db.init_schema().unwrap();
    PipelineRunner {
        post_store: Arc::new(SqlitePostStore::new(db.clone())),
        link_store: Arc::new(SqliteLinkStore::new(db.clone())),
        profile_store: Arc::new(SqliteProfileStore::new(db)),
        executor: Arc::new(executor),
        event_bus: Arc::new(InMemoryEventBus::new()),
        rules_dir: tempfile::tempdir().unwrap().keep(),
        max_attempts,
    }
}

/// S2 then S3: a review-gated stage pauses the run, and approving it
/// enqueues (here: directly drives) a continuation that reaches completion.
#[tokio::test]
async fn review_pause_then_approval_resumes_to_completion() {
    let runner = build(3);
    let mut post = Post::new("s1", config());
    for stage in STAGES {
        post.stage_settings.insert(stage, GateMode::Auto);
    }
    post.stage_settings.insert(Stage::Outline, GateMode::Review);
    runner.post_store.create(&post).await.unwrap();

    // S2: run to the review gate.
    let outcome = runner.run_full_pipeline(post.id, 1).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Settled));

    let paused = runner.post_store.get(post.id).await.unwrap();
    assert_eq!(paused.current_stage, CurrentStage::Stage(Stage::Outline));
    assert_eq!(paused.status_of(Stage::Research), Some(StageStatus::Complete));
    assert_eq!(paused.status_of(Stage::Outline), Some(StageStatus::Review));

    // S3: approve the paused stage with an edited value, then resume.
    let mut approved = paused;
    GateController::approve(&mut approved, Stage::Outline, Some("edited outline".to_string())).unwrap();
    runner.post_store.save(&approved).await.unwrap();
    assert_eq!(approved.current_stage, CurrentStage::Stage(Stage::Write));

    let outcome = runner.run_full_pipeline(post.id, 1).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Settled));

    let done = runner.post_store.get(post.id).await.unwrap();
    assert_eq!(done.current_stage, CurrentStage::Complete);
    assert_eq!(done.content.outline_content.as_deref(), Some("edited outline"));
    for stage in STAGES {
        assert_eq!(done.status_of(stage), Some(StageStatus::Complete));
    }
}

/// `rerun_stage`-style single-stage execution ignores gate mode and current
/// completion state, matching the "force a re-run" contract used by the
/// Approval API's `rerun-stage` operation.
#[tokio::test]
async fn single_stage_run_bypasses_the_gate() {
    let runner = build(3);
    let mut post = Post::new("s1", config());
    post.stage_settings.insert(Stage::Edit, GateMode::Review);
    runner.post_store.create(&post).await.unwrap();

    let outcome = runner.run_single_stage(post.id, Stage::Edit, 1).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Settled));

    let loaded = runner.post_store.get(post.id).await.unwrap();
    assert_eq!(loaded.status_of(Stage::Edit), Some(StageStatus::Complete));
}
