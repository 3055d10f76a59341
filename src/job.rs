//! Retrieval job orchestration.
//!
//! One job fetches the video-only and audio-only streams sequentially,
//! resolves what the tool actually produced, and publishes the readiness
//! record. Whatever happens inside the body, the enqueue lock is released
//! exactly once afterwards; a failed job leaves no record, so the next
//! readiness poll re-triggers a fresh attempt from a clean state.

use crate::error::{CacheError, Result};
use crate::ids::VideoId;
use crate::lock::EnqueueLock;
use crate::queue::JobPayload;
use crate::resolver;
use crate::retriever::{FetchRequest, Retriever, StreamKind};
use crate::store::{MediaRecord, MediaStore};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Everything a worker needs to execute jobs. Built once per process.
#[derive(Clone)]
pub struct JobContext {
    pub media_root: PathBuf,
    pub store: MediaStore,
    pub lock: EnqueueLock,
    pub retriever: Arc<dyn Retriever>,
    /// Per-invocation wall-clock bound; the whole job is separately bounded
    /// by the payload's timeout.
    pub tool_timeout: Duration,
}

/// Result record reported back for observability. Correctness only depends
/// on the published metadata and the released lock.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub ok: bool,
    pub video_id: String,
    pub job_id: String,
    pub video_path: Option<PathBuf>,
    pub audio_path: Option<PathBuf>,
    pub elapsed_ms: u128,
    pub error: Option<String>,
}

/// Runs one retrieval job to completion. Never panics or returns early in a
/// way that skips the lock release: the fallible body is awaited first and
/// the release happens unconditionally after it, on success, failure, and
/// job timeout alike.
pub async fn run(ctx: &JobContext, payload: &JobPayload) -> JobOutcome {
    let started = Instant::now();
    let id = &payload.video_id;
    let job_timeout = Duration::from_secs(payload.timeout_secs);

    let result = match tokio::time::timeout(job_timeout, execute(ctx, id)).await {
        Ok(result) => result,
        Err(_) => Err(CacheError::JobTimeout {
            timeout_secs: payload.timeout_secs,
        }),
    };

    ctx.lock.release(id).await;

    let elapsed_ms = started.elapsed().as_millis();
    match result {
        Ok((video_path, audio_path)) => {
            info!(video_id = %id, job_id = %payload.job_id, elapsed_ms, "retrieval complete");
            JobOutcome {
                ok: true,
                video_id: id.as_str().to_owned(),
                job_id: payload.job_id.clone(),
                video_path: Some(video_path),
                audio_path: Some(audio_path),
                elapsed_ms,
                error: None,
            }
        }
        Err(err) => {
            warn!(video_id = %id, job_id = %payload.job_id, elapsed_ms, error = %err, "retrieval failed");
            JobOutcome {
                ok: false,
                video_id: id.as_str().to_owned(),
                job_id: payload.job_id.clone(),
                video_path: None,
                audio_path: None,
                elapsed_ms,
                error: Some(err.to_string()),
            }
        }
    }
}

/// The fallible job body: fetch both streams, resolve outputs, publish the
/// record. Resolution happens only after both invocations report success,
/// and a tool "success" with no usable file is still a failure.
async fn execute(ctx: &JobContext, id: &VideoId) -> Result<(PathBuf, PathBuf)> {
    tokio::fs::create_dir_all(&ctx.media_root).await?;

    invoke_tool(ctx, id, StreamKind::Video).await?;
    invoke_tool(ctx, id, StreamKind::Audio).await?;

    let video_path = resolve_output(ctx, id, StreamKind::Video)?;
    let audio_path = resolve_output(ctx, id, StreamKind::Audio)?;

    let record = MediaRecord::new(id, &video_path, &audio_path, Utc::now().timestamp());
    ctx.store.put(&record).await?;

    Ok((video_path, audio_path))
}

async fn invoke_tool(ctx: &JobContext, id: &VideoId, kind: StreamKind) -> Result<()> {
    let request = FetchRequest::for_kind(&ctx.media_root, id, kind, ctx.tool_timeout);
    let output = ctx.retriever.fetch(&request).await?;

    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        warn!(video_id = %id, kind = %kind, "tool stderr:\n{}", stderr);
    }
    if !output.success() {
        return Err(CacheError::ToolFailed {
            kind,
            status: output.status,
            stderr: stderr.to_owned(),
        });
    }
    Ok(())
}

fn resolve_output(ctx: &JobContext, id: &VideoId, kind: StreamKind) -> Result<PathBuf> {
    let candidates = resolver::candidate_paths(&ctx.media_root, id, kind)?;
    resolver::pick_newest_nonempty(&candidates).ok_or(CacheError::MissingOutput { kind })
}


#[cfg(test)]
mod tests {
    use super::fakes::{FakeBehavior, FakeRetriever};
    use super::*;
    use crate::kv::{KvStore, MemoryStore};
    use tempfile::{TempDir, tempdir};

    fn id() -> VideoId {
        VideoId::new("abc12345678").unwrap()
    }

    fn payload(timeout_secs: u64) -> JobPayload {
        JobPayload {
            job_id: "job-1".to_owned(),
            video_id: id(),
            timeout_secs,
        }
    }

    struct Harness {
        _dir: TempDir,
        fake: Arc<FakeRetriever>,
        ctx: JobContext,
    }

    fn harness(video: FakeBehavior, audio: FakeBehavior) -> Harness {
        let dir = tempdir().unwrap();
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let fake = Arc::new(FakeRetriever::new(video, audio));
        let ctx = JobContext {
            media_root: dir.path().to_path_buf(),
            store: MediaStore::new(kv.clone()),
            lock: EnqueueLock::new(kv),
            retriever: fake.clone(),
            tool_timeout: Duration::from_secs(30),
        };
        Harness {
            _dir: dir,
            fake,
            ctx,
        }
    }

    async fn lock_is_free(harness: &Harness) -> bool {
        // If a fresh acquire succeeds, the job's release ran.
        harness
            .ctx
            .lock
            .acquire(&id(), Duration::from_secs(10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_job_publishes_record_and_releases_lock() {
        let harness = harness(
            FakeBehavior::Produce {
                ext: "mp4",
                len: 2048,
            },
            FakeBehavior::Produce {
                ext: "m4a",
                len: 1024,
            },
        );
        harness
            .ctx
            .lock
            .acquire(&id(), Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = run(&harness.ctx, &payload(30)).await;

        assert!(outcome.ok, "outcome: {:?}", outcome.error);
        let video_path = outcome.video_path.unwrap();
        let audio_path = outcome.audio_path.unwrap();
        assert!(video_path.to_string_lossy().ends_with("abc12345678.video.mp4"));
        assert!(audio_path.to_string_lossy().ends_with("abc12345678.audio.m4a"));

        let record = harness.ctx.store.get(&id()).await.unwrap().unwrap();
        assert!(record.is_ready());
        assert_eq!(record.video_path, video_path.to_string_lossy());
        assert_eq!(record.watch_url, id().watch_url());

        assert!(lock_is_free(&harness).await);
    }

    #[tokio::test]
    async fn failed_video_invocation_publishes_nothing_and_releases_lock() {
        let harness = harness(
            FakeBehavior::Fail {
                status: 1,
                stderr: "ERROR: unavailable",
            },
            FakeBehavior::Produce {
                ext: "m4a",
                len: 64,
            },
        );
        harness
            .ctx
            .lock
            .acquire(&id(), Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = run(&harness.ctx, &payload(30)).await;

        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("unavailable"));
        assert!(harness.ctx.store.get(&id()).await.unwrap().is_none());
        assert!(lock_is_free(&harness).await);

        // Audio was never attempted: video runs first and its failure ends
        // the job.
        assert_eq!(*harness.fake.calls.lock(), vec![StreamKind::Video]);
    }

    #[tokio::test]
    async fn silent_empty_output_fails_the_job() {
        let harness = harness(
            FakeBehavior::Produce {
                ext: "mp4",
                len: 512,
            },
            FakeBehavior::ProduceEmpty { ext: "m4a" },
        );

        let outcome = run(&harness.ctx, &payload(30)).await;

        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("missing or empty"));
        assert!(harness.ctx.store.get(&id()).await.unwrap().is_none());
        assert!(lock_is_free(&harness).await);
    }

    #[tokio::test]
    async fn job_timeout_fails_cleanly_and_releases_lock() {
        let harness = harness(
            FakeBehavior::Hang,
            FakeBehavior::Produce {
                ext: "m4a",
                len: 64,
            },
        );
        harness
            .ctx
            .lock
            .acquire(&id(), Duration::from_secs(60))
            .await
            .unwrap();

        let outcome = run(&harness.ctx, &payload(0)).await;

        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("timeout"));
        assert!(harness.ctx.store.get(&id()).await.unwrap().is_none());
        assert!(lock_is_free(&harness).await);
    }

    #[tokio::test]
    async fn streams_are_fetched_sequentially_video_first() {
        let harness = harness(
            FakeBehavior::Produce {
                ext: "mp4",
                len: 10,
            },
            FakeBehavior::Produce {
                ext: "m4a",
                len: 10,
            },
        );

        let outcome = run(&harness.ctx, &payload(30)).await;
        assert!(outcome.ok);

        assert_eq!(
            *harness.fake.calls.lock(),
            vec![StreamKind::Video, StreamKind::Audio]
        );
        let record = harness.ctx.store.get(&id()).await.unwrap().unwrap();
        assert!(record.video_path.ends_with(".video.mp4"));
        assert!(record.audio_path.ends_with(".audio.m4a"));
    }
}
