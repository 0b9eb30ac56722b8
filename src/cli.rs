//! CLI surface (binary name `postforge`): drive the worker pool, run a
//! single scheduler tick, or retry a dead-lettered job — the operational
//! entrypoints around the engine. Concrete stage implementations and the
//! HTTP Approval surface are not part of this crate (§1); this CLI only
//! exercises the queue/runner/crawl machinery directly.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use uuid::Uuid;

use postforge::approval::ApprovalApi;
use postforge::config::Settings;
use postforge::crawl::CrawlWorker;
use postforge::executor::StageExecutor;
use postforge::queue::{InMemoryJobQueue, JobQueueClient};
use postforge::registry::Stage;
use postforge::scheduler::Scheduler;
use postforge::store::{Db, SqliteLinkStore, SqlitePostStore, SqliteProfileStore};

use crate::worker;

#[derive(Parser)]
#[command(name = "postforge")]
#[command(about = "Pipeline execution engine for staged, human-gated content generation jobs")]
#[command(version)]
pub struct Cli {
    /// Override the database path (default: $POSTFORGE_DATABASE_PATH or postforge.db)
    #[arg(long, global = true)]
    database_path: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup, before clap parses).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool, consuming jobs from the Job Queue Client until idle
    Work {
        /// Number of concurrent workers (default: from POSTFORGE_MAX_JOBS)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run one scheduler tick, enqueueing recrawl jobs for due profiles
    Tick,

    /// Retry a dead-lettered post
    RetryDeadLetter {
        /// Post ID
        post_id: Uuid,
    },

    /// Start a post's pipeline from the first stage
    Start {
        /// Post ID
        post_id: Uuid,
    },

    /// Approve a stage currently awaiting review
    Approve {
        /// Post ID
        post_id: Uuid,
        /// Stage name (research, outline, write, edit, images, ready)
        stage: String,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env();
    if let Some(path) = cli.database_path {
        settings.database_path = path;
    }

    match cli.command {
        Commands::Work { workers } => cmd_work(&settings, workers).await,
        Commands::Tick => cmd_tick(&settings).await,
        Commands::RetryDeadLetter { post_id } => cmd_retry_dead_letter(&settings, post_id).await,
        Commands::Start { post_id } => cmd_start(&settings, post_id).await,
        Commands::Approve { post_id, stage } => cmd_approve(&settings, post_id, &stage).await,
    }
}

fn open_db(settings: &Settings) -> anyhow::Result<Db> {
    let db = Db::open(&settings.database_path)?;
    db.init_schema()?;
    Ok(db)
}

/// The in-memory job queue is the only backend this crate ships without the
/// `redis-backend` feature — a single `postforge work` process is therefore
/// the whole worker pool for that configuration (§5).
async fn job_queue(_settings: &Settings) -> Arc<dyn JobQueueClient> {
    #[cfg(feature = "redis-backend")]
    {
        if let Ok(client) = postforge::queue::RedisJobQueue::new(&_settings.redis_url).await {
            return Arc::new(client);
        }
    }
    Arc::new(InMemoryJobQueue::new())
}

async fn cmd_work(settings: &Settings, workers: Option<usize>) -> anyhow::Result<()> {
    let worker_count = workers.unwrap_or(settings.max_jobs);
    let db = open_db(settings)?;
    let queue = job_queue(settings).await;

    let post_store = Arc::new(SqlitePostStore::new(db.clone()));
    let link_store = Arc::new(SqliteLinkStore::new(db.clone()));
    let profile_store = Arc::new(SqliteProfileStore::new(db.clone()));

    let event_bus: Arc<dyn postforge::events::EventBus> =
        Arc::new(postforge::events::InMemoryEventBus::new());

    let runner = Arc::new(postforge::runner::PipelineRunner {
        post_store,
        link_store: link_store.clone(),
        profile_store: profile_store.clone(),
        executor: Arc::new(StageExecutor::new()),
        event_bus,
        rules_dir: settings.rules_dir.clone(),
        max_attempts: settings.max_attempts,
    });
    let crawl_worker = Arc::new(CrawlWorker::new(
        profile_store,
        link_store,
        settings.sitemap_fetch_timeout,
    ));

    println!(
        "{} Starting {} worker(s)",
        style("→").cyan(),
        worker_count
    );

    let mut handles = Vec::with_capacity(worker_count);
    for worker_id in 0..worker_count {
        let queue = queue.clone();
        let runner = runner.clone();
        let crawl_worker = crawl_worker.clone();
        let job_timeout = settings.job_timeout;
        let retry_delay = settings.retry_delay;

        handles.push(tokio::spawn(async move {
            worker::run_worker_loop(worker_id, queue, runner, crawl_worker, job_timeout, retry_delay)
                .await;
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn cmd_tick(settings: &Settings) -> anyhow::Result<()> {
    let db = open_db(settings)?;
    let profile_store = Arc::new(SqliteProfileStore::new(db));
    let scheduler = Scheduler {
        profile_store,
        job_queue: job_queue(settings).await,
    };
    let enqueued = scheduler.tick().await?;
    println!("{} Enqueued {} recrawl job(s)", style("✓").green(), enqueued);
    Ok(())
}

async fn approval_api(settings: &Settings) -> anyhow::Result<ApprovalApi> {
    let db = open_db(settings)?;
    Ok(ApprovalApi {
        post_store: Arc::new(SqlitePostStore::new(db)),
        job_queue: job_queue(settings).await,
    })
}

async fn cmd_retry_dead_letter(settings: &Settings, post_id: Uuid) -> anyhow::Result<()> {
    approval_api(settings).await?.retry_dead_letter(post_id).await?;
    println!("{} Re-enqueued dead-lettered post {}", style("✓").green(), post_id);
    Ok(())
}

async fn cmd_start(settings: &Settings, post_id: Uuid) -> anyhow::Result<()> {
    approval_api(settings).await?.start_pipeline(post_id).await?;
    println!("{} Started pipeline for post {}", style("✓").green(), post_id);
    Ok(())
}

async fn cmd_approve(settings: &Settings, post_id: Uuid, stage: &str) -> anyhow::Result<()> {
    let stage = Stage::from_str(stage)
        .ok_or_else(|| anyhow::anyhow!("unknown stage '{}'", stage))?;
    approval_api(settings).await?.approve(post_id, stage, None).await?;
    println!("{} Approved {} for post {}", style("✓").green(), stage, post_id);
    Ok(())
}
