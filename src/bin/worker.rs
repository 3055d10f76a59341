//! Retrieval worker: pops jobs off the shared queue and runs them.
//!
//! One process can run many workers; the enqueue lock makes concurrent
//! workers safe, so scaling out is just starting more copies of this binary
//! against the same Redis and media directory.

use anyhow::{Context, Result, bail};
use avcache::config::{Config, DEFAULT_CONFIG_PATH};
use avcache::job::{self, JobContext};
use avcache::kv::{KvStore, RedisStore};
use avcache::lock::EnqueueLock;
use avcache::queue::RedisListQueue;
use avcache::retriever::YtDlp;
use avcache::store::MediaStore;
use clap::Parser;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const QUEUE_WAIT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "worker", about = "Media retrieval worker")]
struct Args {
    /// Config file path, KEY=VALUE lines.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

fn ensure_program_available(name: &str) -> Result<()> {
    let status = std::process::Command::new(name)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => Ok(()),
        Ok(_) => bail!("{} is installed but returned a failure status", name),
        Err(err) => bail!("{} is not installed or not in PATH: {}", name, err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load_from(&args.config)
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    ensure_program_available("yt-dlp")?;

    let kv: Arc<dyn KvStore> = Arc::new(
        RedisStore::connect(&config.redis_url)
            .await
            .with_context(|| format!("connecting to {}", config.redis_url))?,
    );
    let queue = RedisListQueue::new(kv.clone(), config.queue_key.clone());
    let ctx = JobContext {
        media_root: config.media_root.clone(),
        store: MediaStore::new(kv.clone()),
        lock: EnqueueLock::new(kv.clone()),
        retriever: Arc::new(YtDlp::new()),
        tool_timeout: config.tool_timeout,
    };

    info!(
        media_root = %config.media_root.display(),
        queue = %config.queue_key,
        "worker started"
    );

    loop {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(err) = result {
                    error!(error = %err, "failed to listen for shutdown signal");
                }
                info!("shutting down");
                break;
            }
            next = queue.next_job(QUEUE_WAIT) => {
                match next {
                    Ok(Some(payload)) => {
                        let outcome = job::run(&ctx, &payload).await;
                        if outcome.ok {
                            info!(
                                video_id = %outcome.video_id,
                                job_id = %outcome.job_id,
                                elapsed_ms = outcome.elapsed_ms,
                                "retrieval complete"
                            );
                        } else {
                            warn!(
                                video_id = %outcome.video_id,
                                job_id = %outcome.job_id,
                                elapsed_ms = outcome.elapsed_ms,
                                error = outcome.error.as_deref().unwrap_or("unknown"),
                                "retrieval failed"
                            );
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        error!(error = %err, "queue poll failed");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }

    Ok(())
}
