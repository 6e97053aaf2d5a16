//! CLI command definitions for dining-concierge.
//!
//! Every worker command builds the same [`WorkerContext`] from environment
//! configuration plus flags, then drives one of the invocation styles.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::{EmailConfig, WorkerConfig};
use crate::intake::handle_dialog_event;
use crate::notify::{HttpEmailNotifier, LogNotifier, Notifier};
use crate::scheduler::{DiningJob, JobQueue, MemoryJobQueue, RedisJobQueue};
use crate::search::{CandidateSampler, OpenSearchClient};
use crate::storage::SqliteRecordStore;
use crate::worker::{FulfillmentWorker, Invocation, Poller, WorkerContext};

/// Default Redis connection URL.
const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Default queue name.
const DEFAULT_QUEUE_NAME: &str = "dining-requests";

/// Default record store location.
const DEFAULT_DATABASE_URL: &str = "sqlite://restaurants.db";

/// Restaurant recommendation worker.
#[derive(Parser)]
#[command(name = "dining-concierge")]
#[command(about = "Fulfill queued dining requests with emailed restaurant recommendations")]
#[command(version)]
#[command(
    long_about = "dining-concierge consumes dining requests from a queue, samples matching restaurants from a search index, enriches them from the record store and emails the suggestions.\n\nExample usage:\n  dining-concierge poll --concurrency 4\n  dining-concierge handle-event event.json --dry-run"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run a single pull invocation and print its result.
    Run(WorkerArgs),

    /// Run pull invocations until interrupted.
    Poll(WorkerArgs),

    /// Process an invocation payload from a file or stdin.
    ///
    /// A payload with `Records` is handled as a pushed batch, anything else
    /// triggers a pull from the queue.
    HandleEvent(HandleEventArgs),

    /// Apply a dialog event and enqueue the request once complete.
    Intake(IntakeArgs),

    /// Enqueue a dining request directly.
    Enqueue(EnqueueArgs),

    /// Create the restaurants table in the record store.
    InitStore(InitStoreArgs),
}

/// Queue connection arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct QueueArgs {
    /// Redis connection URL.
    #[arg(long, env = "DINING_REDIS_URL", default_value = DEFAULT_REDIS_URL)]
    pub redis_url: String,

    /// Queue name.
    #[arg(long, env = "DINING_QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,
}

/// Arguments shared by the worker commands.
#[derive(clap::Args, Debug, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub queue: QueueArgs,

    /// Record store URL.
    #[arg(long, env = "DINING_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,

    /// Log emails instead of sending them.
    #[arg(long)]
    pub dry_run: bool,

    /// Jobs processed in parallel (overrides DINING_CONCURRENCY).
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Messages per receive (overrides DINING_BATCH_SIZE).
    #[arg(short = 'b', long)]
    pub batch_size: Option<usize>,

    /// Seed for candidate sampling, for reproducible runs.
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Arguments for `dining-concierge handle-event`.
#[derive(Parser, Debug)]
pub struct HandleEventArgs {
    /// Path to the JSON payload. Reads stdin when omitted or `-`.
    pub event: Option<PathBuf>,

    #[command(flatten)]
    pub worker: WorkerArgs,
}

/// Arguments for `dining-concierge intake`.
#[derive(Parser, Debug)]
pub struct IntakeArgs {
    /// Path to the dialog event. Reads stdin when omitted or `-`.
    pub event: Option<PathBuf>,

    #[command(flatten)]
    pub queue: QueueArgs,
}

/// Arguments for `dining-concierge enqueue`.
#[derive(Parser, Debug)]
pub struct EnqueueArgs {
    /// Requested cuisine.
    #[arg(long)]
    pub cuisine: String,

    /// Recipient address.
    #[arg(long)]
    pub email: String,

    /// Neighbourhood or city.
    #[arg(long, default_value = "")]
    pub location: String,

    /// Requested time.
    #[arg(long, default_value = "")]
    pub dining_time: String,

    /// Number of people.
    #[arg(long, default_value = "")]
    pub party_size: String,

    #[command(flatten)]
    pub queue: QueueArgs,
}

/// Arguments for `dining-concierge init-store`.
#[derive(Parser, Debug)]
pub struct InitStoreArgs {
    /// Record store URL.
    #[arg(long, env = "DINING_DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    pub database_url: String,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_once_command(args).await?,
        Commands::Poll(args) => run_poll_command(args).await?,
        Commands::HandleEvent(args) => run_handle_event_command(args).await?,
        Commands::Intake(args) => run_intake_command(args).await?,
        Commands::Enqueue(args) => run_enqueue_command(args).await?,
        Commands::InitStore(args) => run_init_store_command(args).await?,
    }
    Ok(())
}

// ============================================================================
// Worker Commands
// ============================================================================

async fn run_once_command(args: WorkerArgs) -> anyhow::Result<()> {
    let queue = connect_queue(&args.queue).await?;
    let worker = build_worker(&args, queue).await?;

    let result = worker.handle(Invocation::Pull).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        anyhow::bail!("Invocation failed with status {}", result.status_code);
    }
    Ok(())
}

async fn run_poll_command(args: WorkerArgs) -> anyhow::Result<()> {
    let queue = connect_queue(&args.queue).await?;
    let worker = Arc::new(build_worker(&args, queue).await?);
    let poller = Poller::new(worker);

    let shutdown = poller.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing current batch");
            // Ignore send error - the poller may have already stopped
            let _ = shutdown.send(());
        }
    });

    let stats = poller.run().await;
    println!(
        "Invocations: {}  Sent: {}  Failed: {}  Deferred: {}  Receive errors: {}",
        stats.invocations, stats.processed, stats.failed, stats.deferred, stats.receive_errors
    );
    Ok(())
}

async fn run_handle_event_command(args: HandleEventArgs) -> anyhow::Result<()> {
    let event = read_event(args.event.as_deref())?;
    let invocation = Invocation::from_event(&event)?;

    // A pushed batch never touches the queue.
    let queue: Arc<dyn JobQueue> = match invocation {
        Invocation::Push(_) => Arc::new(MemoryJobQueue::new()),
        Invocation::Pull => connect_queue(&args.worker.queue).await?,
    };
    let worker = build_worker(&args.worker, queue).await?;

    let result = worker.handle(invocation).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        anyhow::bail!("Invocation failed with status {}", result.status_code);
    }
    Ok(())
}

async fn build_worker(
    args: &WorkerArgs,
    queue: Arc<dyn JobQueue>,
) -> anyhow::Result<FulfillmentWorker> {
    let config = worker_config(args)?;

    let search = OpenSearchClient::from_env().context("Search index is not configured")?;
    let store = SqliteRecordStore::connect(&args.database_url).await?;
    let notifier = build_notifier(args.dry_run)?;

    let mut ctx = WorkerContext::new(queue, Arc::new(search), Arc::new(store), notifier)
        .with_config(config.clone());
    if let Some(seed) = args.seed {
        ctx = ctx.with_sampler(CandidateSampler::with_seed(config.sample_size, seed));
    }

    Ok(FulfillmentWorker::new(ctx))
}

/// Environment configuration with CLI overrides applied.
fn worker_config(args: &WorkerArgs) -> anyhow::Result<WorkerConfig> {
    let mut config = WorkerConfig::from_env()?;
    if let Some(concurrency) = args.concurrency {
        config = config.with_concurrency(concurrency);
    }
    if let Some(batch_size) = args.batch_size {
        config = config.with_batch_size(batch_size);
    }
    config.validate()?;
    Ok(config)
}

fn build_notifier(dry_run: bool) -> anyhow::Result<Arc<dyn Notifier>> {
    if dry_run {
        warn!("Dry run: emails will be logged, not sent");
        return Ok(Arc::new(LogNotifier::new()));
    }

    match HttpEmailNotifier::from_config(&EmailConfig::from_env()) {
        Some(notifier) => Ok(Arc::new(notifier)),
        None => anyhow::bail!(
            "DINING_EMAIL_ENDPOINT is required but not set.\n\
             Set it, or pass --dry-run to log emails instead."
        ),
    }
}

// ============================================================================
// Queue Producer Commands
// ============================================================================

async fn run_intake_command(args: IntakeArgs) -> anyhow::Result<()> {
    let event = read_event(args.event.as_deref())?;
    let queue = connect_queue(&args.queue).await?;

    let result = handle_dialog_event(&event, queue.as_ref()).await?;
    if let Some(ref message_id) = result.message_id {
        info!(message_id = %message_id, "Request enqueued");
    }
    println!("{}", serde_json::to_string_pretty(&result.response)?);
    Ok(())
}

async fn run_enqueue_command(args: EnqueueArgs) -> anyhow::Result<()> {
    let job = DiningJob::new(args.cuisine, args.email)
        .with_location(args.location)
        .with_dining_time(args.dining_time)
        .with_party_size(args.party_size);
    job.validate()?;

    let queue = connect_queue(&args.queue).await?;
    let message_id = queue.send(&job.to_message_body()?).await?;
    println!("{}", message_id);
    Ok(())
}

async fn run_init_store_command(args: InitStoreArgs) -> anyhow::Result<()> {
    let store = SqliteRecordStore::connect(&args.database_url).await?;
    store.ensure_schema().await?;
    println!("Record store ready at {}", args.database_url);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

async fn connect_queue(args: &QueueArgs) -> anyhow::Result<Arc<dyn JobQueue>> {
    let queue = RedisJobQueue::connect(&args.redis_url, &args.queue_name)
        .await
        .with_context(|| format!("Failed to connect to queue at {}", args.redis_url))?;
    Ok(Arc::new(queue))
}

/// Reads a JSON payload from `path`, or stdin when absent or `-`.
fn read_event(path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        _ => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Payload is not valid JSON")
}
