pub mod api;
pub mod config;
pub mod core;
pub mod observer;
pub mod queue;
pub mod storage;
pub mod testing;
pub mod worker;

pub use config::Config;
pub use core::job::{Job, JobStatus};
pub use core::types::{JobId, WorkerId};

pub use observer::{Action, AlertSink, Event, MetricsSnapshot, Observer, Severity, StdoutAlertSink};

pub use queue::{Queue, SubmitOutcome};

pub use storage::{InMemoryStore, SqliteStore, StorageError, Store, WriteBatch};

pub use worker::{
    backoff_delay_ms, spawn_workers, Processor, ProcessorError, WikipediaProcessor, Worker,
};
