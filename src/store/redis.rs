//! Redis-backed store for distributed multi-host coordination.
//!
//! Values expire through Redis TTLs. Slot reservation and mark advancement
//! run as Lua scripts so they are atomic across clients.

use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Script};
use async_trait::async_trait;
use tracing::info;

use super::{ceil_millis, Reservation, Store, StoreError, StoreResult};

/// Marks outlive any realistic request spacing; stale ones are dropped.
const MARK_TTL_SECS: i64 = 86400;

const RESERVE_SCRIPT: &str = r#"
local key = KEYS[1]
local now_ms = tonumber(ARGV[1])
local delay_ms = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])

local wait_time = 0
local last = tonumber(redis.call('GET', key))
if last then
    local ready_at = last + delay_ms
    if ready_at > now_ms then
        wait_time = ready_at - now_ms
    end
end

redis.call('SET', key, now_ms + wait_time, 'EX', ttl)
if last then
    return {wait_time, 1, last}
end
return {wait_time, 0, 0}
"#;

const RELEASE_SCRIPT: &str = r#"
local key = KEYS[1]
local slot_ms = tonumber(ARGV[1])
local has_previous = tonumber(ARGV[2])
local previous_ms = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

if tonumber(redis.call('GET', key)) == slot_ms then
    if has_previous == 1 then
        redis.call('SET', key, previous_ms, 'EX', ttl)
    else
        redis.call('DEL', key)
    end
end
return 0
"#;

const ADVANCE_SCRIPT: &str = r#"
local key = KEYS[1]
local at_ms = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local last = tonumber(redis.call('GET', key))
if (not last) or at_ms > last then
    redis.call('SET', key, at_ms, 'EX', ttl)
end
return 0
"#;

/// Redis store.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis, e.g. `redis://localhost:6379`.
    pub async fn new(redis_url: &str) -> StoreResult<Self> {
        let client = ::redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        info!("Connected to Redis store");
        Ok(Self { conn })
    }
}

fn db_err(e: ::redis::RedisError) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(db_err)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        match ttl {
            // Redis rejects a zero expiry, so expire immediately instead.
            Some(ttl) if ttl.is_zero() => conn.del::<_, ()>(key).await.map_err(db_err),
            Some(ttl) => conn
                .pset_ex::<_, _, ()>(key, value, ttl.as_millis() as u64)
                .await
                .map_err(db_err),
            None => conn.set::<_, _, ()>(key, value).await.map_err(db_err),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key).await.map_err(db_err)
    }

    async fn mark(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(db_err)
    }

    async fn advance_mark(&self, key: &str, at_ms: i64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(ADVANCE_SCRIPT)
            .key(key)
            .arg(at_ms)
            .arg(MARK_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn reserve_slot(
        &self,
        key: &str,
        delay: Duration,
        now_ms: i64,
    ) -> StoreResult<Reservation> {
        let mut conn = self.conn.clone();
        let (wait_ms, has_previous, previous_ms): (i64, i64, i64) = Script::new(RESERVE_SCRIPT)
            .key(key)
            .arg(now_ms)
            .arg(ceil_millis(delay))
            .arg(MARK_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(db_err)?;

        let wait_ms = wait_ms.max(0);
        Ok(Reservation {
            wait: Duration::from_millis(wait_ms as u64),
            slot_ms: now_ms + wait_ms,
            previous_ms: (has_previous == 1).then_some(previous_ms),
        })
    }

    async fn release_slot(&self, key: &str, reservation: &Reservation) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(reservation.slot_ms)
            .arg(i64::from(reservation.previous_ms.is_some()))
            .arg(reservation.previous_ms.unwrap_or_default())
            .arg(MARK_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(db_err)?;
        Ok(())
    }
}
