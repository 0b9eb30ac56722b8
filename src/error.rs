//! Error types for the pipeline engine.
//!
//! Mirrors the teacher crate's layered `thiserror` style: one enum per
//! concern, composed into `anyhow::Result` at the binary boundary.

use thiserror::Error;

use crate::registry::Stage;

/// Errors a stage function can raise, distinguishing the two failure
/// classes the executor and runner act on (§4.F, §7).
#[derive(Error, Debug)]
pub enum StageError {
    #[error("transient error: {0}")]
    Transient(String),
    #[error("permanent error: {0}")]
    Permanent(String),
}

impl StageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Repository-layer errors (Post Store, Link Catalog, Profile Store).
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: {0}")]
    NotFound(String),
}

pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Errors surfaced by Gate Controller / Approval API operations — the
/// "validation / 4xx" class from §7, returned synchronously, never retried.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("post not found: {0}")]
    PostNotFound(uuid::Uuid),

    #[error("profile not found: {0}")]
    ProfileNotFound(uuid::Uuid),

    #[error("stage '{0}' is not awaiting approval")]
    InvalidApproval(Stage),

    #[error("stage '{0}' is gated approve_only and cannot have its content overwritten")]
    ContentOverwriteNotAllowed(Stage),

    #[error("dead-letter entry not found for post {0}")]
    DeadLetterEntryNotFound(uuid::Uuid),

    #[error("job queue error: {0}")]
    Queue(String),
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
