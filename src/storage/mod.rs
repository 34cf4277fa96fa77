//! Persistence adapter over a durable ordered key-value store.
//!
//! This module provides a trait-based store abstraction with pluggable
//! backends (in-memory, SQLite). Logical tables are key ranges; keys are
//! ASCII-comparable strings, so lexicographic range scans double as
//! availability-ordered reads. Multi-operation writes are atomic: either the
//! whole group becomes visible or none of it does.

mod memory;
mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::{close_all, SqliteStore};

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Store lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// A conditional operation in an atomic group lost a race; the group was
    /// rolled back.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic store error.
    #[error("storage error: {0}")]
    Other(String),
}

/// A single operation inside an atomic group write.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Put {
        table: &'static str,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        table: &'static str,
        key: String,
    },
    /// Delete that requires the key to exist; a missing key aborts the whole
    /// group with [`StorageError::Conflict`].
    Take {
        table: &'static str,
        key: String,
    },
    /// Put that requires the key to be absent; an existing key aborts the
    /// whole group with [`StorageError::Conflict`].
    Insert {
        table: &'static str,
        key: String,
        value: Vec<u8>,
    },
}

/// An atomic group of write operations, possibly spanning tables.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub(crate) ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an upsert.
    pub fn put(&mut self, table: &'static str, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put {
            table,
            key: key.into(),
            value,
        });
    }

    /// Queue an unconditional delete.
    pub fn delete(&mut self, table: &'static str, key: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            table,
            key: key.into(),
        });
    }

    /// Queue a delete that aborts the group when the key is already gone.
    ///
    /// This is the claim-race primitive: of two groups taking the same key,
    /// exactly one commits.
    pub fn take(&mut self, table: &'static str, key: impl Into<String>) {
        self.ops.push(WriteOp::Take {
            table,
            key: key.into(),
        });
    }

    /// Queue a put that aborts the group when the key already exists.
    ///
    /// This is the creation-race primitive: of two groups inserting the same
    /// key, exactly one commits.
    pub fn insert(&mut self, table: &'static str, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(WriteOp::Insert {
            table,
            key: key.into(),
            value,
        });
    }

    /// Whether the batch contains no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable ordered key-value store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Point read.
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Point upsert.
    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Point delete; deleting a missing key is a no-op.
    async fn delete(&self, table: &str, key: &str) -> Result<(), StorageError>;

    /// Ordered range scan over `[start, ∞)`, ascending by key, with an
    /// optional result limit.
    async fn scan(
        &self,
        table: &str,
        start: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError>;

    /// Apply an atomic group write. All operations commit together or none
    /// do; a failed [`WriteBatch::take`] rolls the group back with
    /// [`StorageError::Conflict`].
    async fn apply(&self, batch: WriteBatch) -> Result<(), StorageError>;
}

/// Encode an ordered key: `pad(timestamp, width) || "-" || suffix`.
///
/// Zero-padding makes lexicographic order over the encoding identical to
/// `(timestamp, suffix)` numeric order. Width 13 covers millisecond
/// timestamps through year 2286.
pub fn ordered_key(timestamp: u64, suffix: &str, width: usize) -> String {
    format!("{:0width$}-{}", timestamp, suffix, width = width)
}

/// Parse the timestamp prefix of an ordered key.
pub fn parse_key_timestamp(key: &str, width: usize) -> Option<u64> {
    key.get(..width)?.parse().ok()
}

/// Parse the suffix (after the separator) of an ordered key.
pub fn parse_key_suffix(key: &str, width: usize) -> Option<&str> {
    key.get(width + 1..)
}
