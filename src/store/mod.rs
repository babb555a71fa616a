//! Shared key-value store for quota schedules, cached responses and the
//! last-request mark.
//!
//! Every process that talks to the API with the same credentials must see
//! the same store, otherwise pacing only holds within one process:
//! - In-memory (single process, not persisted)
//! - SQLite (persisted, multi-process on one host)
//! - Redis (distributed, multi-host)

mod memory;
mod sqlite;

#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::models::Server;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from store backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Key prefix for everything this crate writes.
pub const KEY_PREFIX: &str = "yandex-xml:";

/// Trait for shared store backends.
///
/// Implementations must be thread-safe. Marks are epoch milliseconds and
/// are kept apart from cached values.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a live (non-expired) value.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Store a value. `None` keeps it until overwritten.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Current value of a last-request mark.
    async fn mark(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Move a mark forward to `at_ms`. Never moves it backwards.
    async fn advance_mark(&self, key: &str, at_ms: i64) -> StoreResult<()>;

    /// Atomically claim the next request slot.
    ///
    /// Moves the mark to `now_ms + wait` in the same step so concurrent
    /// callers queue behind it.
    async fn reserve_slot(&self, key: &str, delay: Duration, now_ms: i64)
        -> StoreResult<Reservation>;

    /// Give back a slot that was never used.
    ///
    /// Restores the previous mark only while the mark still equals the
    /// reserved slot; a later reservation keeps its place.
    async fn release_slot(&self, key: &str, reservation: &Reservation) -> StoreResult<()>;
}

/// A claimed request slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// How long the caller must wait before sending.
    pub wait: Duration,
    /// Mark value written for this slot.
    pub slot_ms: i64,
    /// Mark value before the slot was claimed.
    pub previous_ms: Option<i64>,
}

impl Reservation {
    pub fn new(previous_ms: Option<i64>, delay: Duration, now_ms: i64) -> Self {
        let wait = wait_after(previous_ms, delay, now_ms);
        Self {
            wait,
            slot_ms: now_ms + wait.as_millis() as i64,
            previous_ms,
        }
    }
}

/// Type alias for a shared store handle.
pub type SharedStore = Arc<dyn Store>;

/// Spacing in whole milliseconds, rounded up so a wait never falls short.
pub fn ceil_millis(delay: Duration) -> i64 {
    delay.as_nanos().div_ceil(1_000_000) as i64
}

/// Wait required before the next call given a mark and a minimum spacing.
pub fn wait_after(mark_ms: Option<i64>, delay: Duration, now_ms: i64) -> Duration {
    match mark_ms {
        Some(last_ms) => {
            let ready_at = last_ms + ceil_millis(delay);
            if now_ms >= ready_at {
                Duration::ZERO
            } else {
                Duration::from_millis((ready_at - now_ms) as u64)
            }
        }
        None => Duration::ZERO,
    }
}

/// Deserialize a JSON value from the store.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn Store,
    key: &str,
) -> StoreResult<Option<T>> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize a value to JSON and store it.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn Store,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> StoreResult<()> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, &bytes, ttl).await
}

/// Key for the cached quota schedule of one account on one endpoint.
pub fn schedule_key(server: Server, login: &str) -> String {
    format!("{}limits:{}:{}", KEY_PREFIX, server.host(), login)
}

/// Key for the last-request mark shared by everyone using `login`.
pub fn mark_key(login: &str) -> String {
    format!("{}last-request:{}", KEY_PREFIX, login)
}

/// Key for a cached response. The signature embeds the API key, so only
/// its digest is written to the store.
pub fn response_key(signature: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signature.as_bytes());
    format!("{}response:{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}
