//! Error taxonomy for the caching engine.
//!
//! Lock contention is deliberately absent: "already in flight" is a normal
//! outcome reported through `Option`, not an error.

use crate::retriever::StreamKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("key-value store error: {0}")]
    Store(String),

    #[error("invalid video id {0:?}: expected 11 characters of [A-Za-z0-9_-]")]
    InvalidVideoId(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{kind} download failed (status {status}): {stderr}")]
    ToolFailed {
        kind: StreamKind,
        status: i32,
        stderr: String,
    },

    #[error("{kind} download timed out after {timeout_secs}s")]
    ToolTimeout { kind: StreamKind, timeout_secs: u64 },

    #[error("{kind} download finished but output file is missing or empty")]
    MissingOutput { kind: StreamKind },

    #[error("job exceeded its {timeout_secs}s timeout")]
    JobTimeout { timeout_secs: u64 },
}

pub type Result<T> = std::result::Result<T, CacheError>;
