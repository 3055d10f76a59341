//! Job queue boundary.
//!
//! Submission is the only operation the coordinator needs; dequeueing and
//! executing is the worker's side of the contract. The Redis implementation
//! is a plain list of JSON payloads: at-least-once, one job per pop, with
//! the caller-supplied timeout carried inside the payload so the executing
//! worker can bound the whole job.

use crate::error::Result;
use crate::ids::VideoId;
use crate::kv::KvStore;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Opaque reference to a submitted job, for observability only; correctness
/// never depends on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: String,
}

/// What travels through the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub job_id: String,
    pub video_id: VideoId,
    /// Whole-job bound, strictly greater than the sum of the per-invocation
    /// tool timeouts.
    pub timeout_secs: u64,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn submit(&self, id: &VideoId, timeout: Duration) -> Result<JobHandle>;
}

/// Redis-list-backed queue shared by enqueuers and workers.
#[derive(Clone)]
pub struct RedisListQueue {
    kv: Arc<dyn KvStore>,
    queue_key: String,
}

impl RedisListQueue {
    pub fn new(kv: Arc<dyn KvStore>, queue_key: impl Into<String>) -> Self {
        Self {
            kv,
            queue_key: queue_key.into(),
        }
    }

    /// Worker side: blocks up to `wait` for the next payload. `None` just
    /// means the queue stayed empty; callers loop.
    pub async fn next_job(&self, wait: Duration) -> Result<Option<JobPayload>> {
        let raw = self.kv.blpop(&self.queue_key, wait).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobQueue for RedisListQueue {
    async fn submit(&self, id: &VideoId, timeout: Duration) -> Result<JobHandle> {
        let payload = JobPayload {
            job_id: Uuid::new_v4().to_string(),
            video_id: id.clone(),
            timeout_secs: timeout.as_secs(),
        };
        let bytes = serde_json::to_vec(&payload)?;
        self.kv.rpush(&self.queue_key, &bytes).await?;
        debug!(video_id = %id, job_id = %payload.job_id, "job submitted");
        Ok(JobHandle {
            job_id: payload.job_id,
        })
    }
}
