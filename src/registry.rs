//! Stage registry: the ordered, compile-time table of pipeline stages (§4.E).
//!
//! Adding a stage is a single table-row change here plus a `StageFn`
//! implementation — the runner never branches on stage name.

use serde::{Deserialize, Serialize};

/// A registered pipeline stage. Declaration order IS execution order;
/// `Stage`'s derived `Ord` is the sole source of truth the runner consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Outline,
    Write,
    Edit,
    Images,
    Ready,
}

/// Full, declared-order stage list.
pub const STAGES: [Stage; 6] = [
    Stage::Research,
    Stage::Outline,
    Stage::Write,
    Stage::Edit,
    Stage::Images,
    Stage::Ready,
];

/// Which external provider class a stage's work belongs to (cost-table
/// lookup and documentation only — no behavioral branching on this tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTag {
    Search,
    LlmText,
    LlmTextAndImageGen,
}

/// Compile-time metadata for one registry row.
#[derive(Debug, Clone, Copy)]
pub struct StageMeta {
    pub stage: Stage,
    pub output_key: &'static str,
    pub rules_file: &'static str,
    pub provider: ProviderTag,
}

const META: [StageMeta; 6] = [
    StageMeta {
        stage: Stage::Research,
        output_key: "research",
        rules_file: "blog-research.md",
        provider: ProviderTag::Search,
    },
    StageMeta {
        stage: Stage::Outline,
        output_key: "outline",
        rules_file: "blog-outline.md",
        provider: ProviderTag::LlmText,
    },
    StageMeta {
        stage: Stage::Write,
        output_key: "draft",
        rules_file: "blog-write.md",
        provider: ProviderTag::LlmText,
    },
    StageMeta {
        stage: Stage::Edit,
        output_key: "final_md",
        rules_file: "blog-edit.md",
        provider: ProviderTag::LlmText,
    },
    StageMeta {
        stage: Stage::Images,
        output_key: "image_manifest",
        rules_file: "blog-images.md",
        provider: ProviderTag::LlmTextAndImageGen,
    },
    StageMeta {
        stage: Stage::Ready,
        output_key: "ready",
        rules_file: "blog-ready.md",
        provider: ProviderTag::LlmText,
    },
];

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Outline => "outline",
            Self::Write => "write",
            Self::Edit => "edit",
            Self::Images => "images",
            Self::Ready => "ready",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        STAGES.iter().find(|st| st.as_str() == s).copied()
    }

    pub fn meta(&self) -> &'static StageMeta {
        META.iter().find(|m| m.stage == *self).expect("every Stage has a registry row")
    }

    /// Position within the declared registry order.
    pub fn index(&self) -> usize {
        STAGES.iter().position(|s| s == self).expect("stage in registry")
    }

    pub fn next(&self) -> Option<Stage> {
        STAGES.get(self.index() + 1).copied()
    }

    pub fn first() -> Stage {
        STAGES[0]
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_matches_registry_declaration() {
        assert_eq!(Stage::Research.index(), 0);
        assert_eq!(Stage::Ready.index(), 5);
        assert!(Stage::Research < Stage::Outline);
        assert!(Stage::Images < Stage::Ready);
    }

    #[test]
    fn round_trips_through_str() {
        for stage in STAGES {
            assert_eq!(Stage::from_str(stage.as_str()), Some(stage));
        }
        assert_eq!(Stage::from_str("bogus"), None);
    }

    #[test]
    fn next_chains_to_end() {
        let mut cur = Stage::first();
        let mut count = 1;
        while let Some(n) = cur.next() {
            cur = n;
            count += 1;
        }
        assert_eq!(count, STAGES.len());
        assert_eq!(cur, Stage::Ready);
    }
}
