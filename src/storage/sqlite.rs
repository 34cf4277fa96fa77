//! SQLite store implementation.
//!
//! Durable backend over a single `kv(tbl, key, value)` table. Ordered scans
//! ride the `(tbl, key)` primary key; group writes are transactions.
//!
//! Handles are cached process-wide by database path: the queue's job table
//! and its ordered index must share one connection pool so a claim's
//! conditional delete and job update commit in a single transaction. Opening
//! the same path twice would break that, so all opens route through
//! [`SqliteStore::open`].

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

use super::{StorageError, Store, WriteBatch, WriteOp};

/// Process-wide cache of open stores, keyed by database path.
fn handle_cache() -> &'static Mutex<HashMap<String, Arc<SqliteStore>>> {
    static CACHE: OnceLock<Mutex<HashMap<String, Arc<SqliteStore>>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// SQLite store backend.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or reuse) the store at the given database path.
    ///
    /// The same path always resolves to the same underlying handle within
    /// the process. Creates the database file and any parent directories on
    /// first open, and runs migrations.
    pub async fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, StorageError> {
        let path_str = path.as_ref().to_string_lossy().into_owned();
        let mut cache = handle_cache().lock().await;
        if let Some(existing) = cache.get(&path_str) {
            return Ok(Arc::clone(existing));
        }

        let store = Arc::new(Self::connect(&path_str).await?);
        cache.insert(path_str, Arc::clone(&store));
        Ok(store)
    }

    async fn connect(path: &str) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Other(e.to_string()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))
            .map_err(|e| StorageError::Other(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run database migrations.
    async fn run_migrations(&self) -> Result<(), StorageError> {
        let schema = include_str!("../../migrations/001_initial_schema.sql");
        sqlx::raw_sql(schema)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(format!("migration failed: {}", e)))?;
        Ok(())
    }

    /// Close the underlying connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Close every cached store handle. Shutdown hook.
pub async fn close_all() {
    let mut cache = handle_cache().lock().await;
    for (_, store) in cache.drain() {
        store.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row = sqlx::query("SELECT value FROM kv WHERE tbl = ? AND key = ?")
            .bind(table)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>(0)))
    }

    async fn put(&self, table: &str, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO kv (tbl, key, value) VALUES (?, ?, ?) \
             ON CONFLICT (tbl, key) DO UPDATE SET value = excluded.value",
        )
        .bind(table)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM kv WHERE tbl = ? AND key = ?")
            .bind(table)
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }

    async fn scan(
        &self,
        table: &str,
        start: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        // LIMIT -1 means unbounded in SQLite.
        let limit = limit.map(|n| n as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT key, value FROM kv WHERE tbl = ? AND key >= ? ORDER BY key ASC LIMIT ?",
        )
        .bind(table)
        .bind(start)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Other(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<Vec<u8>, _>(1)))
            .collect())
    }

    async fn apply(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;

        for op in batch.ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    sqlx::query(
                        "INSERT INTO kv (tbl, key, value) VALUES (?, ?, ?) \
                         ON CONFLICT (tbl, key) DO UPDATE SET value = excluded.value",
                    )
                    .bind(table)
                    .bind(key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                }
                WriteOp::Delete { table, key } => {
                    sqlx::query("DELETE FROM kv WHERE tbl = ? AND key = ?")
                        .bind(table)
                        .bind(key)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StorageError::Other(e.to_string()))?;
                }
                WriteOp::Take { table, key } => {
                    let result = sqlx::query("DELETE FROM kv WHERE tbl = ? AND key = ?")
                        .bind(table)
                        .bind(&key)
                        .execute(&mut *tx)
                        .await
                        .map_err(|e| StorageError::Other(e.to_string()))?;
                    if result.rows_affected() == 0 {
                        tx.rollback()
                            .await
                            .map_err(|e| StorageError::Other(e.to_string()))?;
                        return Err(StorageError::Conflict(format!("{}/{}", table, key)));
                    }
                }
                WriteOp::Insert { table, key, value } => {
                    let result = sqlx::query(
                        "INSERT INTO kv (tbl, key, value) VALUES (?, ?, ?) \
                         ON CONFLICT (tbl, key) DO NOTHING",
                    )
                    .bind(table)
                    .bind(&key)
                    .bind(value)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                    if result.rows_affected() == 0 {
                        tx.rollback()
                            .await
                            .map_err(|e| StorageError::Other(e.to_string()))?;
                        return Err(StorageError::Conflict(format!("{}/{}", table, key)));
                    }
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?;
        Ok(())
    }
}
