//! Key-Value Store boundary.
//!
//! The shared store is the single source of truth for both the enqueue lock
//! and the metadata cache, so the trait is deliberately narrow: atomic
//! conditional set with expiry, plain get/set/delete, and the two list
//! operations the job queue rides on. No process-local cache of any of this
//! state is ever kept.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use redis::{AsyncCommands, aio::ConnectionManager};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Key layout shared by every component. The store is flat, so prefixes are
/// the only namespacing there is.
pub mod keys {
    /// Metadata record for a cached video.
    pub fn media(id: &str) -> String {
        format!("yt:media:{id}")
    }

    /// Enqueue lock guarding duplicate retrieval.
    pub fn lock(id: &str) -> String {
        format!("yt:lock:{id}")
    }

    /// Most recent job id for an identifier, kept for debugging/status.
    pub fn last_job(id: &str) -> String {
        format!("yt:last_job:{id}")
    }
}

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Atomically creates `key` only if absent, with the given TTL. Returns
    /// whether this call created it. This must be a single store-level
    /// operation; a separate check-then-set would race.
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Deletes `key`. Deleting an absent key is a no-op, not an error.
    async fn del(&self, key: &str) -> Result<()>;

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Pops the head of the list at `key`, blocking up to `timeout` before
    /// returning `None`.
    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Redis-backed store used in production. `ConnectionManager` multiplexes and
/// reconnects internally, so cloning it per call is the intended usage.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl RedisStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("connecting to Redis at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Store(format!("failed to create Redis client: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Store(format!("failed to connect to Redis: {e}")))?;

        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        // SET NX EX replies OK when the key was created and nil otherwise.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(format!("Redis SET NX failed: {e}")))?;
        debug!("SET NX {}: created={}", key, reply.is_some());
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::Store(format!("Redis GET failed: {e}")))?;
        debug!("GET {}: hit={}", key, data.is_some());
        Ok(data)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| CacheError::Store(format!("Redis SET failed: {e}")))?;
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Store(format!("Redis SETEX failed: {e}")))?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::Store(format!("Redis DEL failed: {e}")))?;
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(key, value)
            .await
            .map_err(|e| CacheError::Store(format!("Redis RPUSH failed: {e}")))?;
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let reply: Option<(String, Vec<u8>)> = redis::cmd("BLPOP")
            .arg(key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::Store(format!("Redis BLPOP failed: {e}")))?;
        Ok(reply.map(|(_, value)| value))
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process store with the same semantics as Redis, including TTL expiry.
/// Used by tests and by single-process deployments that do not want a Redis
/// round-trip.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    lists: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes an entry if its TTL has lapsed, mirroring Redis lazy expiry.
    fn live_entry(entries: &mut HashMap<String, MemoryEntry>, key: &str) -> Option<MemoryEntry> {
        match entries.get(key) {
            Some(entry) if entry.expired() => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        if Self::live_entry(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_entry(&mut entries, key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.lock().insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        self.entries.lock().insert(
            key.to_owned(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> Result<()> {
        self.lists
            .lock()
            .entry(key.to_owned())
            .or_default()
            .push_back(value.to_vec());
        Ok(())
    }

    async fn blpop(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self
                .lists
                .lock()
                .get_mut(key)
                .and_then(|list| list.pop_front())
            {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_nx_has_exactly_one_winner() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_nx_ex("k", b"1", ttl).await.unwrap());
        assert!(!store.set_nx_ex("k", b"1", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn set_nx_succeeds_again_after_expiry() {
        let store = MemoryStore::new();
        assert!(
            store
                .set_nx_ex("k", b"1", Duration::from_millis(20))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_nx_ex("k", b"1", Duration::from_secs(10))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(
            store
                .set_nx_ex("k", b"1", Duration::from_secs(10))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn expired_values_read_as_absent() {
        let store = MemoryStore::new();
        store
            .set_ex("k", b"v", Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemoryStore::new();
        store.set("k", b"v").await.unwrap();
        store.del("k").await.unwrap();
        store.del("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_push_pop_is_fifo() {
        let store = MemoryStore::new();
        store.rpush("q", b"a").await.unwrap();
        store.rpush("q", b"b").await.unwrap();
        let first = store.blpop("q", Duration::from_millis(10)).await.unwrap();
        let second = store.blpop("q", Duration::from_millis(10)).await.unwrap();
        let empty = store.blpop("q", Duration::from_millis(10)).await.unwrap();
        assert_eq!(first, Some(b"a".to_vec()));
        assert_eq!(second, Some(b"b".to_vec()));
        assert_eq!(empty, None);
    }

    #[test]
    fn key_helpers_share_the_flat_namespace() {
        assert_eq!(keys::media("abc12345678"), "yt:media:abc12345678");
        assert_eq!(keys::lock("abc12345678"), "yt:lock:abc12345678");
        assert_eq!(keys::last_job("abc12345678"), "yt:last_job:abc12345678");
    }
}
