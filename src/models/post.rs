//! Post: one content-generation job and its pipeline progress.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::registry::Stage;

/// Gate mode for a single stage, read from `Post::stage_settings`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMode {
    Auto,
    Review,
    ApproveOnly,
}

impl GateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Review => "review",
            Self::ApproveOnly => "approve_only",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "review" => Some(Self::Review),
            "approve_only" => Some(Self::ApproveOnly),
            _ => None,
        }
    }
}

/// Status of a single stage's execution within a Post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Running,
    Review,
    Complete,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Review => "review",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "review" => Some(Self::Review),
            "complete" => Some(Self::Complete),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Where the runner currently stands: either a registered stage name or one
/// of the reserved tokens disjoint from all stage names (§6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentStage {
    Pending,
    Paused,
    Complete,
    Failed,
    Stage(Stage),
}

impl CurrentStage {
    pub fn as_str(&self) -> String {
        match self {
            Self::Pending => "pending".to_string(),
            Self::Paused => "paused".to_string(),
            Self::Complete => "complete".to_string(),
            Self::Failed => "failed".to_string(),
            Self::Stage(s) => s.as_str().to_string(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "paused" => Self::Paused,
            "complete" => Self::Complete,
            "failed" => Self::Failed,
            other => Stage::from_str(other)
                .map(Self::Stage)
                .unwrap_or(Self::Pending),
        }
    }
}

/// Desired rendered output for a Post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Markdown,
    Wordpress,
    Both,
}

/// Execution metrics recorded for a single stage run (§3 `stage_logs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageLog {
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub duration_s: f64,
    pub cost_usd: f64,
}

/// Terminal-failure record stored at `stage_logs._error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// One append-only audit-trail entry (§3 `execution_logs`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub stage: Option<Stage>,
    pub level: LogLevel,
    pub event: String,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Static configuration supplied when a Post is created (§3 Config).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostConfig {
    pub topic: String,
    pub audience: String,
    pub tone: String,
    pub target_word_count: u32,
    pub output_format: OutputFormat,
    pub related_keywords: Vec<String>,
    pub image_style: String,
    pub image_colors: Vec<String>,
    pub image_exclusions: Vec<String>,
    pub required_mentions: Vec<String>,
    pub avoid: Vec<String>,
    pub competitor_urls: Vec<String>,
    pub profile_id: Option<Uuid>,
}

/// Per-stage generated content slots (§3: non-empty iff status is review/complete).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageContent {
    pub research_content: Option<String>,
    pub outline_content: Option<String>,
    pub draft_content: Option<String>,
    pub final_md_content: Option<String>,
    pub final_html_content: Option<String>,
    pub image_manifest: Option<serde_json::Value>,
    pub ready_content: Option<String>,
}

impl StageContent {
    /// Read the content field(s) associated with `stage`'s output key, joined
    /// for a non-empty check; used to enforce the "content non-empty iff
    /// status ∈ {review, complete}" invariant.
    pub fn is_populated(&self, stage: Stage) -> bool {
        match stage {
            Stage::Research => self.research_content.is_some(),
            Stage::Outline => self.outline_content.is_some(),
            Stage::Write => self.draft_content.is_some(),
            Stage::Edit => self.final_md_content.is_some(),
            Stage::Images => self.image_manifest.is_some(),
            Stage::Ready => self.ready_content.is_some(),
        }
    }
}

/// A content-generation job, driven stage by stage through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub slug: String,
    pub profile_id: Option<Uuid>,
    pub config: PostConfig,
    pub content: StageContent,
    pub stage_settings: HashMap<Stage, GateMode>,
    pub stage_status: HashMap<Stage, StageStatus>,
    pub current_stage: CurrentStage,
    pub stage_logs: HashMap<Stage, StageLog>,
    pub error: Option<ErrorRecord>,
    pub execution_logs: Vec<ExecutionLogEntry>,
    /// Stored but never consulted by the runner (open question, §9).
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(slug: impl Into<String>, config: PostConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            profile_id: config.profile_id,
            config,
            content: StageContent::default(),
            stage_settings: HashMap::new(),
            stage_status: HashMap::new(),
            current_stage: CurrentStage::Pending,
            stage_logs: HashMap::new(),
            error: None,
            execution_logs: Vec::new(),
            priority: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Gate mode for `stage`, defaulting to `review` if absent or unknown (§4.G).
    pub fn mode_for(&self, stage: Stage) -> GateMode {
        self.stage_settings
            .get(&stage)
            .copied()
            .unwrap_or(GateMode::Review)
    }

    pub fn status_of(&self, stage: Stage) -> Option<StageStatus> {
        self.stage_status.get(&stage).copied()
    }

    pub fn append_log(
        &mut self,
        stage: Option<Stage>,
        level: LogLevel,
        event: impl Into<String>,
        message: impl Into<String>,
        data: serde_json::Value,
    ) {
        self.execution_logs.push(ExecutionLogEntry {
            timestamp: Utc::now(),
            stage,
            level,
            event: event.into(),
            message: message.into(),
            data,
        });
    }
}
