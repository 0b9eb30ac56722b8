//! Gate Controller (§4.G): decides whether a stage proceeds automatically
//! or suspends the pipeline for human input, and applies an approval once
//! it arrives.
//!
//! Modeled as a `GateDecision` sum type rather than a string mode with
//! implicit branching, matching the Design Notes' "sum types over string
//! modes" guidance.

use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::models::{GateMode, LogLevel, Post, StageStatus};
use crate::registry::Stage;

/// What the runner should do next for a stage, given its gate mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    PauseForReview,
    PauseForApproval,
}

/// Stateless decision logic over a `Post` + target stage.
pub struct GateController;

impl GateController {
    /// Decide what to do for `stage`, mutating `post` in place when the
    /// decision is to pause (§4.G).
    pub fn decide(post: &mut Post, stage: Stage) -> GateDecision {
        let mode = match post.stage_settings.get(&stage) {
            Some(mode) => *mode,
            None => {
                warn!(stage = %stage, "no gate mode set for stage, defaulting to review");
                GateMode::Review
            }
        };

        match mode {
            GateMode::Auto => GateDecision::Proceed,
            GateMode::Review => {
                Self::pause(post, stage, "stage_review");
                GateDecision::PauseForReview
            }
            GateMode::ApproveOnly => {
                Self::pause(post, stage, "stage_review");
                GateDecision::PauseForApproval
            }
        }
    }

    fn pause(post: &mut Post, stage: Stage, event: &str) {
        post.stage_status.insert(stage, StageStatus::Review);
        post.current_stage = crate::models::CurrentStage::Stage(stage);
        post.append_log(
            Some(stage),
            LogLevel::Info,
            event,
            format!("paused at {stage} for human input"),
            serde_json::json!({}),
        );
    }

    /// Apply an external approval for `stage`, optionally overwriting its
    /// content, advancing `current_stage` to the next incomplete stage.
    /// Returns an error if `stage` is not currently awaiting review (§4.G
    /// idempotence: approving twice, or approving a stage already passed,
    /// is rejected), or if `overwrite_content` is given for a stage gated
    /// `approve_only` (§4.G: that mode's guarantee is that the approval call
    /// itself never mutates content).
    pub fn approve(
        post: &mut Post,
        stage: Stage,
        overwrite_content: Option<String>,
    ) -> EngineResult<()> {
        if post.status_of(stage) != Some(StageStatus::Review) {
            return Err(EngineError::InvalidApproval(stage));
        }

        if let Some(content) = overwrite_content {
            if post.stage_settings.get(&stage) == Some(&GateMode::ApproveOnly) {
                return Err(EngineError::ContentOverwriteNotAllowed(stage));
            }
            Self::overwrite_content(post, stage, content);
        }

        post.stage_status.insert(stage, StageStatus::Complete);
        post.current_stage = match stage.next() {
            Some(next) => crate::models::CurrentStage::Stage(next),
            None => crate::models::CurrentStage::Complete,
        };
        post.append_log(
            Some(stage),
            LogLevel::Info,
            "stage_approved",
            format!("{stage} approved"),
            serde_json::json!({}),
        );
        Ok(())
    }

    fn overwrite_content(post: &mut Post, stage: Stage, content: String) {
        match stage {
            Stage::Research => post.content.research_content = Some(content),
            Stage::Outline => post.content.outline_content = Some(content),
            Stage::Write => post.content.draft_content = Some(content),
            Stage::Edit => post.content.final_md_content = Some(content),
            Stage::Images => {
                post.content.image_manifest = serde_json::from_str(&content).ok();
            }
            Stage::Ready => post.content.ready_content = Some(content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OutputFormat, PostConfig};

    fn config() -> PostConfig {
        PostConfig {
            topic: "t".to_string(),
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

    #[test]
    fn auto_mode_proceeds_without_mutation() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Research, GateMode::Auto);
        let decision = GateController::decide(&mut post, Stage::Research);
        assert_eq!(decision, GateDecision::Proceed);
        assert_eq!(post.status_of(Stage::Research), None);
    }

    #[test]
    fn review_mode_pauses_and_sets_current_stage() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Outline, GateMode::Review);
        let decision = GateController::decide(&mut post, Stage::Outline);
        assert_eq!(decision, GateDecision::PauseForReview);
        assert_eq!(post.status_of(Stage::Outline), Some(StageStatus::Review));
        assert_eq!(post.current_stage.as_str(), "outline");
    }

    #[test]
    fn unknown_mode_falls_back_to_review() {
        let mut post = Post::new("s1", config());
        let decision = GateController::decide(&mut post, Stage::Write);
        assert_eq!(decision, GateDecision::PauseForReview);
    }

    #[test]
    fn approve_advances_to_next_incomplete_stage() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Outline, GateMode::Review);
        GateController::decide(&mut post, Stage::Outline);

        GateController::approve(&mut post, Stage::Outline, Some("edited outline".to_string())).unwrap();

        assert_eq!(post.content.outline_content.as_deref(), Some("edited outline"));
        assert_eq!(post.status_of(Stage::Outline), Some(StageStatus::Complete));
        assert_eq!(post.current_stage.as_str(), "write");
    }

    #[test]
    fn approve_last_stage_marks_pipeline_complete() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Ready, GateMode::Review);
        GateController::decide(&mut post, Stage::Ready);

        GateController::approve(&mut post, Stage::Ready, None).unwrap();
        assert_eq!(post.current_stage.as_str(), "complete");
    }

    #[test]
    fn approving_a_stage_not_in_review_is_rejected() {
        let mut post = Post::new("s1", config());
        let err = GateController::approve(&mut post, Stage::Research, None).unwrap_err();
        assert!(matches!(err, EngineError::InvalidApproval(Stage::Research)));
    }

    #[test]
    fn approve_only_rejects_content_overwrite() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Outline, GateMode::ApproveOnly);
        GateController::decide(&mut post, Stage::Outline);

        let err = GateController::approve(&mut post, Stage::Outline, Some("sneaky".to_string())).unwrap_err();
        assert!(matches!(err, EngineError::ContentOverwriteNotAllowed(Stage::Outline)));
        assert_eq!(post.content.outline_content, None);
        assert_eq!(post.status_of(Stage::Outline), Some(StageStatus::Review));
    }

    #[test]
    fn approve_only_without_overwrite_still_advances() {
        let mut post = Post::new("s1", config());
        post.stage_settings.insert(Stage::Outline, GateMode::ApproveOnly);
        GateController::decide(&mut post, Stage::Outline);

        GateController::approve(&mut post, Stage::Outline, None).unwrap();
        assert_eq!(post.status_of(Stage::Outline), Some(StageStatus::Complete));
        assert_eq!(post.current_stage.as_str(), "write");
    }
}
