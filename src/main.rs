//! aviary - a durable research-job queue service.
//!
//! Usage:
//!   aviary serve    Run the admission API over the queue and observer
//!   aviary work     Run a pool of polling workers

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use aviary::api::{start_server, ApiConfig, ApiState};
use aviary::config::{
    Config, DEFAULT_BASE_DELAY_MS, DEFAULT_FAILURE_RATE_THRESHOLD, DEFAULT_MAX_RETRIES,
    DEFAULT_METRICS_WINDOW_MS, DEFAULT_OBSERVER_DB_PATH, DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT,
    DEFAULT_QUEUE_DB_PATH, DEFAULT_TIMESTAMP_PAD_LENGTH, DEFAULT_WORKER_CONCURRENCY,
};
use aviary::observer::Observer;
use aviary::queue::Queue;
use aviary::storage::{close_all, SqliteStore, Store};
use aviary::worker::{spawn_workers, Processor, WikipediaProcessor};

/// aviary - a durable research-job queue service
#[derive(Parser)]
#[command(name = "aviary")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by both entry points.
#[derive(Args)]
struct StoreOptions {
    /// Filesystem location of the queue store.
    #[arg(long, env = "QUEUE_DB_PATH", default_value = DEFAULT_QUEUE_DB_PATH)]
    queue_db_path: PathBuf,

    /// Filesystem location of the event log.
    #[arg(long, env = "OBSERVER_DB_PATH", default_value = DEFAULT_OBSERVER_DB_PATH)]
    observer_db_path: PathBuf,

    /// Default metrics window in milliseconds.
    #[arg(long, env = "DEFAULT_METRICS_WINDOW_MS", default_value_t = DEFAULT_METRICS_WINDOW_MS)]
    metrics_window_ms: u64,

    /// Alert threshold on the failure rate, in [0, 1].
    #[arg(long, env = "FAILURE_RATE_THRESHOLD", default_value_t = DEFAULT_FAILURE_RATE_THRESHOLD)]
    failure_rate_threshold: f64,

    /// Key width for millisecond-timestamp padding.
    #[arg(long, env = "TIMESTAMP_PAD_LENGTH", default_value_t = DEFAULT_TIMESTAMP_PAD_LENGTH)]
    timestamp_pad_length: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the admission API.
    Serve {
        /// Port to listen on.
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        #[command(flatten)]
        store: StoreOptions,
    },

    /// Run a pool of polling workers.
    Work {
        /// Number of worker agents to launch.
        #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = DEFAULT_WORKER_CONCURRENCY)]
        concurrency: usize,

        /// Worker tick interval in milliseconds.
        #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS)]
        poll_interval_ms: u64,

        /// Backoff base in milliseconds.
        #[arg(long, env = "BASE_DELAY_MS", default_value_t = DEFAULT_BASE_DELAY_MS)]
        base_delay_ms: u64,

        /// Maximum retry count before permanent failure.
        #[arg(long, env = "MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,

        #[command(flatten)]
        store: StoreOptions,
    },
}

impl StoreOptions {
    fn apply(self, config: &mut Config) {
        config.queue_db_path = self.queue_db_path;
        config.observer_db_path = self.observer_db_path;
        config.default_metrics_window_ms = self.metrics_window_ms;
        config.failure_rate_threshold = self.failure_rate_threshold;
        config.timestamp_pad_length = self.timestamp_pad_length;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, store } => {
            let mut config = Config::default();
            config.port = port;
            store.apply(&mut config);
            serve(config).await?;
        }
        Commands::Work {
            concurrency,
            poll_interval_ms,
            base_delay_ms,
            max_retries,
            store,
        } => {
            let mut config = Config::default();
            config.worker_concurrency = concurrency;
            config.poll_interval_ms = poll_interval_ms;
            config.base_delay_ms = base_delay_ms;
            config.max_retries = max_retries;
            store.apply(&mut config);
            work(config).await?;
        }
    }

    Ok(())
}

async fn open_components(config: &Config) -> Result<(Arc<Queue>, Arc<Observer>), aviary::StorageError> {
    let queue_store: Arc<dyn Store> = SqliteStore::open(&config.queue_db_path).await?;
    let observer_store: Arc<dyn Store> = SqliteStore::open(&config.observer_db_path).await?;

    let queue = Arc::new(Queue::new(queue_store).with_pad_width(config.timestamp_pad_length));
    let observer = Arc::new(
        Observer::new(observer_store)
            .with_pad_width(config.timestamp_pad_length)
            .with_default_window_ms(config.default_metrics_window_ms)
            .with_failure_rate_threshold(config.failure_rate_threshold),
    );
    Ok((queue, observer))
}

/// Run the admission API until interrupted.
async fn serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (queue, observer) = open_components(&config).await?;
    let state = ApiState { queue, observer };

    let server = start_server(ApiConfig::new("0.0.0.0", config.port), state).await?;

    info!("Press Ctrl+C to stop");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
        _ = server => {}
    }

    close_all().await;
    Ok(())
}

/// Run the worker pool until interrupted.
async fn work(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (queue, observer) = open_components(&config).await?;
    let processor: Arc<dyn Processor> = Arc::new(WikipediaProcessor::new());

    info!(
        concurrency = config.worker_concurrency,
        poll_interval_ms = config.poll_interval_ms,
        "Starting workers"
    );
    let handles = spawn_workers(
        config.worker_concurrency,
        queue,
        observer,
        processor,
        &config,
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    for handle in handles {
        handle.abort();
    }

    close_all().await;
    Ok(())
}
