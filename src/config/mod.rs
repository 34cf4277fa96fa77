//! Runtime configuration.
//!
//! One typed struct carrying every deployment option, with the defaults the
//! reference deployment ships. The binary populates it from flags and
//! environment variables; library users can build it directly.

use std::path::PathBuf;

/// Admission surface listen port.
pub const DEFAULT_PORT: u16 = 3000;
/// Filesystem location of the queue store.
pub const DEFAULT_QUEUE_DB_PATH: &str = "data/queue.db";
/// Filesystem location of the event log.
pub const DEFAULT_OBSERVER_DB_PATH: &str = "data/observer.db";
/// Worker tick interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 250;
/// Backoff base in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Maximum retry count before permanent failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default metrics window: three hours.
pub const DEFAULT_METRICS_WINDOW_MS: u64 = 3 * 60 * 60 * 1000;
/// Alert threshold on the failure rate, in `[0, 1]`.
pub const DEFAULT_FAILURE_RATE_THRESHOLD: f64 = 0.5;
/// Key width for millisecond-timestamp padding. 13 digits cover timestamps
/// through year 2286.
pub const DEFAULT_TIMESTAMP_PAD_LENGTH: usize = 13;
/// Number of worker agents the worker entry point launches.
pub const DEFAULT_WORKER_CONCURRENCY: usize = 1;

/// Deployment configuration for the queue service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Admission surface listen port.
    pub port: u16,
    /// Filesystem location of the queue store.
    pub queue_db_path: PathBuf,
    /// Filesystem location of the event log.
    pub observer_db_path: PathBuf,
    /// Worker tick interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Backoff base in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum retry count before permanent failure.
    pub max_retries: u32,
    /// Default metrics window in milliseconds.
    pub default_metrics_window_ms: u64,
    /// Alert threshold on the failure rate.
    pub failure_rate_threshold: f64,
    /// Key width for millisecond-timestamp padding.
    pub timestamp_pad_length: usize,
    /// Number of worker agents to launch.
    pub worker_concurrency: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            queue_db_path: PathBuf::from(DEFAULT_QUEUE_DB_PATH),
            observer_db_path: PathBuf::from(DEFAULT_OBSERVER_DB_PATH),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            default_metrics_window_ms: DEFAULT_METRICS_WINDOW_MS,
            failure_rate_threshold: DEFAULT_FAILURE_RATE_THRESHOLD,
            timestamp_pad_length: DEFAULT_TIMESTAMP_PAD_LENGTH,
            worker_concurrency: DEFAULT_WORKER_CONCURRENCY,
        }
    }
}
