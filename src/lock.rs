//! Per-identifier enqueue lock.
//!
//! The lock is nothing more than the existence of `yt:lock:<id>` in the
//! shared store. The TTL is a crash-safety net: if a worker dies without
//! running its cleanup, the key ages out and the next readiness poll can
//! start over. The TTL must therefore outlive any legitimate job, which
//! `Config::validate` enforces.

use crate::error::Result;
use crate::ids::VideoId;
use crate::kv::{KvStore, keys};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EnqueueLock {
    kv: Arc<dyn KvStore>,
}

impl EnqueueLock {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Attempts to take the lock for `id`. Returns whether *this* call
    /// created it; `false` means a retrieval is already in flight (or a
    /// crashed one has not aged out yet).
    pub async fn acquire(&self, id: &VideoId, ttl: Duration) -> Result<bool> {
        let acquired = self
            .kv
            .set_nx_ex(&keys::lock(id.as_str()), b"1", ttl)
            .await?;
        debug!(video_id = %id, acquired, "lock acquire");
        Ok(acquired)
    }

    /// Unconditionally drops the lock. Releasing an absent lock is a no-op,
    /// and store failures are swallowed (with a warning) so that cleanup
    /// paths can never themselves fail; the TTL covers the rare miss.
    pub async fn release(&self, id: &VideoId) {
        if let Err(err) = self.kv.del(&keys::lock(id.as_str())).await {
            warn!(video_id = %id, error = %err, "failed to release enqueue lock; TTL will reclaim it");
        } else {
            debug!(video_id = %id, "lock released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn lock() -> EnqueueLock {
        EnqueueLock::new(Arc::new(MemoryStore::new()))
    }

    fn id() -> VideoId {
        VideoId::new("abc12345678").unwrap()
    }

    #[tokio::test]
    async fn second_acquire_loses_until_release() {
        let lock = lock();
        let id = id();
        let ttl = Duration::from_secs(10);

        assert!(lock.acquire(&id, ttl).await.unwrap());
        assert!(!lock.acquire(&id, ttl).await.unwrap());

        lock.release(&id).await;
        assert!(lock.acquire(&id, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn release_without_lock_is_a_noop() {
        let lock = lock();
        let id = id();
        lock.release(&id).await;
        assert!(lock.acquire(&id, Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn crashed_holder_is_reclaimed_only_after_ttl() {
        let lock = lock();
        let id = id();

        // Holder "crashes": never calls release.
        assert!(lock.acquire(&id, Duration::from_millis(40)).await.unwrap());
        assert!(!lock.acquire(&id, Duration::from_secs(10)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lock.acquire(&id, Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn locks_for_different_ids_are_independent() {
        let lock = lock();
        let ttl = Duration::from_secs(10);
        let a = VideoId::new("aaaaaaaaaaa").unwrap();
        let b = VideoId::new("bbbbbbbbbbb").unwrap();

        assert!(lock.acquire(&a, ttl).await.unwrap());
        assert!(lock.acquire(&b, ttl).await.unwrap());
    }
}
