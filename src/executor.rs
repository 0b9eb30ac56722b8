//! Stage Executor (§4.F): invokes a pluggable stage function against an
//! immutable snapshot, times the call, and accounts tokens/cost.
//!
//! Concrete prompt text, LLM provider SDKs, and image-byte generation are
//! out of scope (§1) — only the `StageFn` contract lives in this crate.
//! Real stage implementations are pluggable adapters satisfying this trait.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StageError;
use crate::models::{Link, PostConfig, StageContent};
use crate::pricing::cost_usd;
use crate::registry::Stage;

/// Read-only input to a stage function: a Post snapshot plus catalog
/// context. Stage functions receive this by value/reference and must not
/// mutate shared state — all persistence happens in the runner (§4.F).
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    pub post_id: Uuid,
    pub slug: String,
    pub config: PostConfig,
    /// Content produced by every already-complete prior stage.
    pub prior_outputs: StageContent,
    /// Link Catalog entries for the Post's profile, consulted by `edit`.
    pub internal_links: Vec<Link>,
    /// Rules text resolved for this stage (empty if the rules file is absent).
    pub rules: String,
}

/// The value a stage function produces for its registry output key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageOutput {
    Text(String),
    /// `edit` may additionally produce rendered HTML alongside markdown.
    EditOutput {
        final_md: String,
        final_html: Option<String>,
    },
    ImageManifest(serde_json::Value),
}

/// What a stage function returns on success, before the executor times it
/// and computes cost.
#[derive(Debug, Clone)]
pub struct StageRunResult {
    pub output: StageOutput,
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

/// Timing + cost metadata recorded once the executor has run a stage,
/// persisted verbatim into `Post::stage_logs` (§3).
#[derive(Debug, Clone)]
pub struct ExecMeta {
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub duration_s: f64,
    pub cost_usd: f64,
}

/// The pluggable contract a concrete stage implementation satisfies.
#[async_trait]
pub trait StageFn: Send + Sync {
    async fn run(&self, snapshot: &StateSnapshot) -> Result<StageRunResult, StageError>;
}

/// Looks up and invokes the `StageFn` registered for a given stage, timing
/// the call and computing `cost_usd`. Holds no state of its own beyond the
/// registered implementations.
pub struct StageExecutor {
    implementations: std::collections::HashMap<Stage, Box<dyn StageFn>>,
}

impl StageExecutor {
    pub fn new() -> Self {
        Self {
            implementations: std::collections::HashMap::new(),
        }
    }

    pub fn register(&mut self, stage: Stage, implementation: Box<dyn StageFn>) {
        self.implementations.insert(stage, implementation);
    }

    /// Run `stage`'s function against `snapshot`, returning its output and
    /// executor-measured metadata. Fails with a permanent error if no
    /// implementation is registered (a configuration error, not a stage
    /// failure, so it is never retried).
    pub async fn execute(
        &self,
        stage: Stage,
        snapshot: &StateSnapshot,
    ) -> Result<(StageOutput, ExecMeta), StageError> {
        let implementation = self.implementations.get(&stage).ok_or_else(|| {
            StageError::Permanent(format!("no stage implementation registered for {stage}"))
        })?;

        let start = Instant::now();
        let result = implementation.run(snapshot).await?;
        let duration_s = start.elapsed().as_secs_f64();

        let cost_usd = cost_usd(&result.model, result.tokens_in, result.tokens_out);
        let meta = ExecMeta {
            model: result.model,
            tokens_in: result.tokens_in,
            tokens_out: result.tokens_out,
            duration_s,
            cost_usd,
        };

        Ok((result.output, meta))
    }
}

impl Default for StageExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    struct StubStage {
        output: &'static str,
    }

    #[async_trait]
    impl StageFn for StubStage {
        async fn run(&self, _snapshot: &StateSnapshot) -> Result<StageRunResult, StageError> {
            Ok(StageRunResult {
                output: StageOutput::Text(self.output.to_string()),
                model: "m".to_string(),
                tokens_in: 100,
                tokens_out: 200,
            })
        }
    }

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            post_id: Uuid::new_v4(),
            slug: "s1".to_string(),
            config: PostConfig {
                topic: "Best keyboards".to_string(),
                audience: String::new(),
                tone: String::new(),
                target_word_count: 0,
                output_format: crate::models::OutputFormat::Markdown,
                related_keywords: vec![],
                image_style: String::new(),
                image_colors: vec![],
                image_exclusions: vec![],
                required_mentions: vec![],
                avoid: vec![],
                competitor_urls: vec![],
                profile_id: None,
            },
            prior_outputs: StageContent::default(),
            internal_links: vec![],
            rules: String::new(),
        }
    }

    #[tokio::test]
    async fn executes_registered_stage_and_computes_cost() {
        let mut executor = StageExecutor::new();
        executor.register(Stage::Research, Box::new(StubStage { output: "research-output" }));

        let (output, meta) = executor.execute(Stage::Research, &snapshot()).await.unwrap();
        match output {
            StageOutput::Text(t) => assert_eq!(t, "research-output"),
            _ => panic!("expected text output"),
        }
        assert_eq!(meta.model, "m");
        assert_eq!(meta.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn missing_implementation_is_permanent() {
        let executor = StageExecutor::new();
        let err = executor.execute(Stage::Outline, &snapshot()).await.unwrap_err();
        assert!(!err.is_transient());
    }
}
