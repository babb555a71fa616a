//! In-memory store for single-process operation.
//!
//! Fast, lock-based store. State is not persisted across restarts and is not
//! visible to other processes, so pacing only holds inside this process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::{Reservation, Store, StoreResult};

/// Internal state for a cached value.
#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        self.expires_at.map_or(true, |at| Instant::now() < at)
    }
}

/// In-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    marks: Arc<RwLock<HashMap<String, i64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live());
        before - entries.len()
    }

    /// Number of stored values, live or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live())
            .map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn mark(&self, key: &str) -> StoreResult<Option<i64>> {
        Ok(self.marks.read().await.get(key).copied())
    }

    async fn advance_mark(&self, key: &str, at_ms: i64) -> StoreResult<()> {
        let mut marks = self.marks.write().await;
        let mark = marks.entry(key.to_string()).or_insert(at_ms);
        *mark = (*mark).max(at_ms);
        Ok(())
    }

    async fn reserve_slot(
        &self,
        key: &str,
        delay: Duration,
        now_ms: i64,
    ) -> StoreResult<Reservation> {
        // Single write lock covers read, compute and update.
        let mut marks = self.marks.write().await;
        let reservation = Reservation::new(marks.get(key).copied(), delay, now_ms);
        marks.insert(key.to_string(), reservation.slot_ms);
        Ok(reservation)
    }

    async fn release_slot(&self, key: &str, reservation: &Reservation) -> StoreResult<()> {
        let mut marks = self.marks.write().await;
        if marks.get(key) == Some(&reservation.slot_ms) {
            match reservation.previous_ms {
                Some(previous) => marks.insert(key.to_string(), previous),
                None => marks.remove(key),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", b"value", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expires() {
        let store = MemoryStore::new();
        store
            .set("k", b"v", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(store.get("k").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.unwrap().is_none());
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_reserve_slot_returns_zero_first_time() {
        let store = MemoryStore::new();
        let wait = store
            .reserve_slot("mark", Duration::from_millis(100), 1_000)
            .await
            .unwrap()
            .wait;
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(store.mark("mark").await.unwrap(), Some(1_000));
    }

    #[tokio::test]
    async fn test_reserve_slot_queues_concurrent_callers() {
        let store = MemoryStore::new();
        let delay = Duration::from_millis(100);

        let first = store.reserve_slot("mark", delay, 1_000).await.unwrap().wait;
        let second = store.reserve_slot("mark", delay, 1_010).await.unwrap().wait;
        let third = store.reserve_slot("mark", delay, 1_020).await.unwrap().wait;

        assert_eq!(first, Duration::ZERO);
        assert_eq!(second, Duration::from_millis(90));
        // Third caller queues behind the slot reserved for the second.
        assert_eq!(third, Duration::from_millis(180));
        assert_eq!(store.mark("mark").await.unwrap(), Some(1_200));
    }

    #[tokio::test]
    async fn test_release_slot_restores_previous_mark() {
        let store = MemoryStore::new();
        let delay = Duration::from_millis(100);
        store.advance_mark("mark", 1_000).await.unwrap();

        let unused = store.reserve_slot("mark", delay, 1_010).await.unwrap();
        assert_eq!(unused.slot_ms, 1_100);
        store.release_slot("mark", &unused).await.unwrap();
        assert_eq!(store.mark("mark").await.unwrap(), Some(1_000));

        // A slot claimed after ours is left alone.
        let unused = store.reserve_slot("mark", delay, 1_020).await.unwrap();
        let queued = store.reserve_slot("mark", delay, 1_030).await.unwrap();
        store.release_slot("mark", &unused).await.unwrap();
        assert_eq!(store.mark("mark").await.unwrap(), Some(queued.slot_ms));

        let fresh = MemoryStore::new();
        let first = fresh.reserve_slot("mark", delay, 5_000).await.unwrap();
        fresh.release_slot("mark", &first).await.unwrap();
        assert_eq!(fresh.mark("mark").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_advance_mark_is_monotonic() {
        let store = MemoryStore::new();
        store.advance_mark("mark", 5_000).await.unwrap();
        store.advance_mark("mark", 4_000).await.unwrap();
        assert_eq!(store.mark("mark").await.unwrap(), Some(5_000));
        store.advance_mark("mark", 6_000).await.unwrap();
        assert_eq!(store.mark("mark").await.unwrap(), Some(6_000));
    }
}
