//! Dedup coordination.
//!
//! `ensure_retrieval` is what the API layer calls on every readiness poll.
//! It must be safe to hammer: a ready record or a held lock makes it a pure
//! read, and under concurrent polls for the same identifier exactly one
//! caller wins the lock and submits exactly one job.

use crate::config::Config;
use crate::error::Result;
use crate::ids::VideoId;
use crate::kv::{KvStore, keys};
use crate::lock::EnqueueLock;
use crate::queue::{JobHandle, JobQueue};
use crate::store::{MediaRecord, MediaStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct Coordinator {
    store: MediaStore,
    lock: EnqueueLock,
    queue: Arc<dyn JobQueue>,
    kv: Arc<dyn KvStore>,
    lock_ttl: Duration,
    job_timeout: Duration,
    last_job_ttl: Duration,
}

impl Coordinator {
    pub fn new(kv: Arc<dyn KvStore>, queue: Arc<dyn JobQueue>, config: &Config) -> Self {
        Self {
            store: MediaStore::new(kv.clone()),
            lock: EnqueueLock::new(kv.clone()),
            queue,
            kv,
            lock_ttl: config.lock_ttl,
            job_timeout: config.job_timeout,
            last_job_ttl: config.last_job_ttl,
        }
    }

    /// Triggers retrieval for `id` unless it is already cached or already in
    /// flight. Returns the job handle when this call was the one that
    /// submitted, `None` otherwise; callers poll again later either way.
    pub async fn ensure_retrieval(&self, id: &VideoId) -> Result<Option<JobHandle>> {
        if let Some(record) = self.store.get(id).await?
            && record.is_ready()
        {
            debug!(video_id = %id, "already cached");
            return Ok(None);
        }

        if !self.lock.acquire(id, self.lock_ttl).await? {
            debug!(video_id = %id, "retrieval already in flight");
            return Ok(None);
        }

        let handle = match self.queue.submit(id, self.job_timeout).await {
            Ok(handle) => handle,
            Err(err) => {
                // Do not leave the identifier parked behind a dead lock for
                // a full TTL when the submit itself failed.
                self.lock.release(id).await;
                return Err(err);
            }
        };

        if let Err(err) = self
            .kv
            .set_ex(
                &keys::last_job(id.as_str()),
                handle.job_id.as_bytes(),
                self.last_job_ttl,
            )
            .await
        {
            warn!(video_id = %id, error = %err, "failed to record last job id");
        }

        info!(video_id = %id, job_id = %handle.job_id, "retrieval job submitted");
        Ok(Some(handle))
    }

    /// Readiness read for the API layer: the current record, if any.
    pub async fn media(&self, id: &VideoId) -> Result<Option<MediaRecord>> {
        self.store.get(id).await
    }
}
