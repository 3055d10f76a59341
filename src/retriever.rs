//! Retrieval tool boundary.
//!
//! The actual media acquisition is delegated to yt-dlp, treated as a black
//! box that is handed a format-selection expression plus an output-path
//! template and writes files into the shared media directory. The trait
//! exists so the job orchestration can be exercised against a fake that
//! produces files deterministically.

use crate::error::{CacheError, Result};
use crate::ids::VideoId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Video-only selection chain: MP4+AVC for browser compatibility, then any
/// MP4, then HLS, then whatever yt-dlp calls best.
pub const VIDEO_FORMAT: &str = "bestvideo[ext=mp4][vcodec^=avc1]/\
                                bestvideo[ext=mp4]/\
                                bestvideo[protocol^=m3u8]/\
                                bestvideo";

/// Audio-only selection chain: M4A, then HLS, then best available.
pub const AUDIO_FORMAT: &str = "bestaudio[ext=m4a]/bestaudio[protocol^=m3u8]/bestaudio";

/// Which half of the split A/V pair an invocation is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }

    pub fn format_expr(self) -> &'static str {
        match self {
            StreamKind::Video => VIDEO_FORMAT,
            StreamKind::Audio => AUDIO_FORMAT,
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One invocation of the retrieval tool.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub kind: StreamKind,
    pub format: String,
    /// Output template with the tool's `%(ext)s` placeholder; the extension
    /// is the tool's choice, not ours.
    pub output_template: String,
    pub url: String,
    /// Hard wall-clock bound enforced by the caller, independent of the
    /// tool's own retry budget.
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn for_kind(
        media_root: &Path,
        id: &VideoId,
        kind: StreamKind,
        timeout: Duration,
    ) -> Self {
        let output_template = media_root
            .join(format!("{}.{}.%(ext)s", id.as_str(), kind.as_str()))
            .to_string_lossy()
            .into_owned();
        Self {
            kind,
            format: kind.format_expr().to_owned(),
            output_template,
            url: id.watch_url(),
            timeout,
        }
    }
}

/// Exit status and captured diagnostics of one tool invocation. A non-zero
/// status is reported here, not as an `Err`; the job decides what failure
/// means.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutput>;
}

/// The real thing: spawns `yt-dlp` with the retry/backoff knobs delegated to
/// the tool and a caller-enforced timeout that kills the process.
#[derive(Debug, Clone)]
pub struct YtDlp {
    program: String,
}

impl Default for YtDlp {
    fn default() -> Self {
        Self::new()
    }
}

impl YtDlp {
    pub fn new() -> Self {
        Self::with_program("yt-dlp")
    }

    /// Overrides the executable, mainly so tests can point at a stub.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Full argument list for one invocation. Split out of `fetch` so the
/// command line can be asserted on without spawning anything.
fn build_args(request: &FetchRequest) -> Vec<String> {
    let mut args: Vec<String> = [
        "--no-playlist",
        "--force-ipv4",
        "--newline",
        "--no-continue",
        "--no-part",
        // Native HLS downloader so segmented variants work without ffmpeg.
        "--hls-prefer-native",
        "--retries",
        "5",
        "--fragment-retries",
        "5",
        "--retry-sleep",
        "1:3",
        "-f",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect();

    args.push(request.format.clone());
    args.push("-o".to_owned());
    args.push(request.output_template.clone());

    if request.kind == StreamKind::Video {
        // Subtitles ride along with the video invocation.
        args.extend(
            [
                "--write-subs",
                "--write-auto-subs",
                "--sub-format",
                "vtt",
                "--output-na-placeholder",
                "",
            ]
            .iter()
            .map(|s| (*s).to_owned()),
        );
    }

    args.push(request.url.clone());
    args
}

#[async_trait]
impl Retriever for YtDlp {
    async fn fetch(&self, request: &FetchRequest) -> Result<ToolOutput> {
        let args = build_args(request);
        debug!(kind = %request.kind, url = %request.url, "spawning {}", self.program);

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        // kill_on_drop reaps the child if the timeout wins the race.
        let output = match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CacheError::ToolTimeout {
                    kind: request.kind,
                    timeout_secs: request.timeout.as_secs(),
                });
            }
        };

        Ok(ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
