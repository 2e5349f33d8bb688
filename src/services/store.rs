//! Shared distributed store behind the rate limiter and response cache.
//!
//! The gateway talks to the store through the [`SharedStore`] trait so tests
//! can substitute an in-process implementation. Every operation is bounded by
//! an operation timeout; callers treat failures as best-effort (the rate
//! limiter fails open, the cache skips).

use crate::utils::clock::Clock;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("store operation timed out")]
    Timeout,
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Surviving content of a sliding-log bucket after eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub count: u64,
    /// Oldest surviving timestamp; drives the reset time on denial.
    pub oldest_ms: Option<u64>,
}

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Evicts log entries older than the window and reports the surviving
    /// count and oldest timestamp. Eviction and read execute atomically.
    async fn window_snapshot(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<WindowSnapshot, StoreError>;

    /// Appends a timestamp to the log and refreshes the key TTL to the
    /// window length.
    async fn window_record(&self, key: &str, now_ms: u64, window_ms: u64)
        -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn put(&self, key: &str, value: &[u8], ttl_ms: u64) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Round-trip liveness check, used by the readiness endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// Redis-backed store using a multiplexed connection manager.
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
    op_timeout: Duration,
}

impl RedisStore {
    pub async fn connect(
        url: &str,
        key_prefix: &str,
        op_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.to_string(),
            op_timeout,
        })
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn window_snapshot(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let key = self.scoped(key);
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut conn = self.conn.clone();

        self.bounded(async move {
            // MULTI/EXEC keeps eviction and the read in one atomic group.
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("ZREMRANGEBYSCORE")
                .arg(&key)
                .arg(0)
                .arg(cutoff)
                .ignore()
                .cmd("ZCARD")
                .arg(&key)
                .cmd("ZRANGE")
                .arg(&key)
                .arg(0)
                .arg(0)
                .arg("WITHSCORES");

            let (count, oldest): (u64, Vec<(String, u64)>) = pipe.query_async(&mut conn).await?;
            Ok(WindowSnapshot {
                count,
                oldest_ms: oldest.first().map(|(_, score)| *score),
            })
        })
        .await
    }

    async fn window_record(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<(), StoreError> {
        let key = self.scoped(key);
        // Random suffix keeps members unique when two requests land in the
        // same millisecond.
        let member = format!("{}-{:06}", now_ms, rand::random::<u32>() % 1_000_000);
        let mut conn = self.conn.clone();

        self.bounded(async move {
            let mut pipe = redis::pipe();
            pipe.atomic()
                .cmd("ZADD")
                .arg(&key)
                .arg(now_ms)
                .arg(member)
                .ignore()
                .cmd("PEXPIRE")
                .arg(&key)
                .arg(window_ms)
                .ignore();
            pipe.query_async::<_, ()>(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let key = self.scoped(key);
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let value: Option<Vec<u8>> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
            Ok(value)
        })
        .await
    }

    async fn put(&self, key: &str, value: &[u8], ttl_ms: u64) -> Result<(), StoreError> {
        let key = self.scoped(key);
        let value = value.to_vec();
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("SET")
                .arg(&key)
                .arg(value)
                .arg("PX")
                .arg(ttl_ms)
                .query_async::<_, ()>(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = self.scoped(key);
        let mut conn = self.conn.clone();
        self.bounded(async move {
            redis::cmd("DEL")
                .arg(&key)
                .query_async::<_, ()>(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        self.bounded(async move {
            let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            if pong == "PONG" {
                Ok(())
            } else {
                Err(StoreError::Backend(format!("unexpected PING reply: {}", pong)))
            }
        })
        .await
    }
}

#[derive(Default)]
struct MemoryInner {
    windows: HashMap<String, Vec<u64>>,
    values: HashMap<String, (Vec<u8>, u64)>,
}

/// In-process store used when Redis is disabled and throughout the tests.
///
/// Mirrors the Redis semantics (sliding log eviction, millisecond TTLs) but
/// offers no cross-process coordination.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(MemoryInner::default()),
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn window_snapshot(
        &self,
        key: &str,
        now_ms: u64,
        window_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        let cutoff = now_ms.saturating_sub(window_ms);
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let log = inner.windows.entry(key.to_string()).or_default();
        log.retain(|t| *t > cutoff);
        Ok(WindowSnapshot {
            count: log.len() as u64,
            oldest_ms: log.iter().min().copied(),
        })
    }

    async fn window_record(
        &self,
        key: &str,
        now_ms: u64,
        _window_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.windows.entry(key.to_string()).or_default().push(now_ms);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = self.clock.now_ms();
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let live = match inner.values.get(key) {
            Some((value, expires_at)) if *expires_at > now => Some(value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if live.is_none() {
            inner.values.remove(key);
        }
        Ok(live)
    }

    async fn put(&self, key: &str, value: &[u8], ttl_ms: u64) -> Result<(), StoreError> {
        let expires_at = self.clock.now_ms() + ttl_ms;
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner
            .values
            .insert(key.to_string(), (value.to_vec(), expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.windows.remove(key);
        inner.values.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Store stub that fails every operation; exercises the fail-open paths in
/// tests.
pub struct BrokenStore;

#[async_trait]
impl SharedStore for BrokenStore {
    async fn window_snapshot(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
    ) -> Result<WindowSnapshot, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn window_record(
        &self,
        _key: &str,
        _now_ms: u64,
        _window_ms: u64,
    ) -> Result<(), StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn put(&self, _key: &str, _value: &[u8], _ttl_ms: u64) -> Result<(), StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Backend("store offline".to_string()))
    }
}
