//! SQLite-backed store for persistent multi-process coordination.
//!
//! Several processes on one host can point at the same file. Slot
//! reservation runs inside an IMMEDIATE transaction, so the write lock is
//! held across the read-compute-write of the mark.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use super::{Reservation, Store, StoreError, StoreResult};

/// How long a writer waits for another process to release the database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL,
    expires_at INTEGER
);
CREATE TABLE IF NOT EXISTS request_marks (
    key TEXT PRIMARY KEY NOT NULL,
    at_ms INTEGER NOT NULL
);
"#;

/// SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened SQLite store at {}", path.display());
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Private in-memory database, mostly for tests.
    pub fn in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> StoreResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Delete expired entries. Returns how many rows were removed.
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        let now_ms = Utc::now().timestamp_millis();
        let removed = self
            .with_conn(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now_ms],
                )?)
            })
            .await?;
        debug!("Purged {} expired store entries", removed);
        Ok(removed)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let key = key.to_string();
        let now_ms = Utc::now().timestamp_millis();
        self.with_conn(move |conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM kv_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(expires_at))) if expires_at <= now_ms => {
                    conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_vec();
        let expires_at = ttl.map(|t| Utc::now().timestamp_millis() + t.as_millis() as i64);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn mark(&self, key: &str) -> StoreResult<Option<i64>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT at_ms FROM request_marks WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?)
        })
        .await
    }

    async fn advance_mark(&self, key: &str, at_ms: i64) -> StoreResult<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO request_marks (key, at_ms) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET at_ms = MAX(at_ms, excluded.at_ms)",
                params![key, at_ms],
            )?;
            Ok(())
        })
        .await
    }

    async fn reserve_slot(
        &self,
        key: &str,
        delay: Duration,
        now_ms: i64,
    ) -> StoreResult<Reservation> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mark: Option<i64> = tx
                .query_row(
                    "SELECT at_ms FROM request_marks WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            let reservation = Reservation::new(mark, delay, now_ms);
            tx.execute(
                "INSERT OR REPLACE INTO request_marks (key, at_ms) VALUES (?1, ?2)",
                params![key, reservation.slot_ms],
            )?;
            tx.commit()?;
            Ok(reservation)
        })
        .await
    }

    async fn release_slot(&self, key: &str, reservation: &Reservation) -> StoreResult<()> {
        let key = key.to_string();
        let reservation = *reservation;
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match reservation.previous_ms {
                Some(previous) => tx.execute(
                    "UPDATE request_marks SET at_ms = ?1 WHERE key = ?2 AND at_ms = ?3",
                    params![previous, key, reservation.slot_ms],
                )?,
                None => tx.execute(
                    "DELETE FROM request_marks WHERE key = ?1 AND at_ms = ?2",
                    params![key, reservation.slot_ms],
                )?,
            };
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
