//! Data models for the pipeline engine.

mod dead_letter;
mod link;
mod post;
mod profile;

pub use dead_letter::DeadLetterEntry;
pub use link::{Link, LinkSource};
pub use post::{
    CurrentStage, ErrorRecord, ExecutionLogEntry, GateMode, LogLevel, OutputFormat, Post,
    PostConfig, StageContent, StageLog, StageStatus,
};
pub use profile::{CrawlStatus, Profile, RecrawlInterval};
