//! In-memory store implementation.
//!
//! Thread-safe ordered tables for testing and development. Data is not
//! persisted across restarts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::RwLock;

use super::{StorageError, Store, WriteBatch, WriteOp};

/// In-memory store backend.
///
/// Each logical table is a `BTreeMap`, so scans come back in key order for
/// free. A single `RwLock` over all tables makes group writes atomic.
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(t) = tables.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn scan(
        &self,
        table: &str,
        start: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        let tables = self.tables.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        let range = t.range::<str, _>((Bound::Included(start), Bound::Unbounded));
        let rows = match limit {
            Some(n) => range.take(n).map(|(k, v)| (k.clone(), v.clone())).collect(),
            None => range.map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        Ok(rows)
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut tables = self.tables.write().map_err(|_| StorageError::LockPoisoned)?;

        // Validate every conditional operation before touching anything, so
        // a lost race leaves the store untouched.
        for op in &batch.ops {
            match op {
                WriteOp::Take { table, key } => {
                    let present = tables.get(*table).map_or(false, |t| t.contains_key(key));
                    if !present {
                        return Err(StorageError::Conflict(format!("{}/{}", table, key)));
                    }
                }
                WriteOp::Insert { table, key, .. } => {
                    let present = tables.get(*table).map_or(false, |t| t.contains_key(key));
                    if present {
                        return Err(StorageError::Conflict(format!("{}/{}", table, key)));
                    }
                }
                WriteOp::Put { .. } | WriteOp::Delete { .. } => {}
            }
        }

        for op in batch.ops {
            match op {
                WriteOp::Put { table, key, value } | WriteOp::Insert { table, key, value } => {
                    tables.entry(table.to_string()).or_default().insert(key, value);
                }
                WriteOp::Delete { table, key } | WriteOp::Take { table, key } => {
                    if let Some(t) = tables.get_mut(table) {
                        t.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
