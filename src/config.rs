//! Engine configuration.
//!
//! Loaded from environment variables (via `dotenvy`, following the teacher
//! crate's `.env`-before-anything-else convention in `main.rs`), with
//! explicit defaults for every tunable named in §5 of the specification.

use std::path::PathBuf;
use std::time::Duration;

/// Engine-wide settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database backing the Post Store / Link Catalog.
    pub database_path: PathBuf,
    /// Redis connection URL, used by the `redis-backend` feature's Event Bus
    /// and Job Queue Client implementations.
    pub redis_url: String,
    /// Directory rules files (`blog-<stage>.md`) are resolved from (§6).
    pub rules_dir: PathBuf,
    /// Fixed-size worker pool consuming jobs from the queue (§5).
    pub max_jobs: usize,
    /// Retry budget per job (§4.H).
    pub max_attempts: u32,
    /// Fixed delay before the queue reschedules a retried job (§4.H).
    pub retry_delay: Duration,
    /// Hard wall-clock timeout per job (§5).
    pub job_timeout: Duration,
    /// Width of the images stage's concurrent image-generation fan-out (§5).
    pub image_fanout_width: usize,
    pub search_timeout: Duration,
    pub llm_timeout: Duration,
    pub image_gen_timeout: Duration,
    pub sitemap_fetch_timeout: Duration,
    pub title_fetch_timeout: Duration,
    pub url_liveness_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("postforge.db"),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            rules_dir: PathBuf::from("rules"),
            max_jobs: 3,
            max_attempts: 3,
            retry_delay: Duration::from_secs(10),
            job_timeout: Duration::from_secs(3600),
            image_fanout_width: 3,
            search_timeout: Duration::from_secs(120),
            llm_timeout: Duration::from_secs(300),
            image_gen_timeout: Duration::from_secs(180),
            sitemap_fetch_timeout: Duration::from_secs(30),
            title_fetch_timeout: Duration::from_secs(10),
            url_liveness_timeout: Duration::from_secs(10),
        }
    }
}

impl Settings {
    /// Load settings from environment variables, applying `.env` first if
    /// present. Every variable is optional; unset variables keep the default.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Ok(v) = std::env::var("POSTFORGE_DATABASE_PATH") {
            settings.database_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("POSTFORGE_REDIS_URL") {
            settings.redis_url = v;
        }
        if let Ok(v) = std::env::var("POSTFORGE_RULES_DIR") {
            settings.rules_dir = PathBuf::from(v);
        }
        if let Some(v) = env_parsed::<usize>("POSTFORGE_MAX_JOBS") {
            settings.max_jobs = v;
        }
        if let Some(v) = env_parsed::<u32>("POSTFORGE_MAX_ATTEMPTS") {
            settings.max_attempts = v;
        }
        if let Some(v) = env_parsed::<u64>("POSTFORGE_RETRY_DELAY_SECS") {
            settings.retry_delay = Duration::from_secs(v);
        }
        if let Some(v) = env_parsed::<u64>("POSTFORGE_JOB_TIMEOUT_SECS") {
            settings.job_timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parsed::<usize>("POSTFORGE_IMAGE_FANOUT_WIDTH") {
            settings.image_fanout_width = v;
        }

        settings
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
