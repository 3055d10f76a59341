//! Metadata readiness store.
//!
//! One JSON record per identifier, written whole by a completed retrieval
//! job and read by anyone asking "is it ready". Records never expire; the
//! media files they point at are cached indefinitely and the store is the
//! sole index of which file is current.

use crate::error::Result;
use crate::ids::VideoId;
use crate::kv::{KvStore, keys};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Readiness record for one cached video.
///
/// A record with both paths populated is terminal: the engine never
/// re-triggers retrieval for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub video_id: String,
    pub watch_url: String,
    pub video_path: String,
    pub audio_path: String,
    /// Unix timestamp of the last successful retrieval.
    pub updated_at: i64,
}

impl MediaRecord {
    pub fn new(
        id: &VideoId,
        video_path: &Path,
        audio_path: &Path,
        updated_at: i64,
    ) -> Self {
        Self {
            video_id: id.as_str().to_owned(),
            watch_url: id.watch_url(),
            video_path: video_path.to_string_lossy().into_owned(),
            audio_path: audio_path.to_string_lossy().into_owned(),
            updated_at,
        }
    }

    /// Both artifacts resolved; nothing left to do for this identifier.
    pub fn is_ready(&self) -> bool {
        !self.video_path.is_empty() && !self.audio_path.is_empty()
    }
}

/// Read/write access to metadata records, keyed by identifier.
#[derive(Clone)]
pub struct MediaStore {
    kv: Arc<dyn KvStore>,
}

impl MediaStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub async fn get(&self, id: &VideoId) -> Result<Option<MediaRecord>> {
        let raw = self.kv.get(&keys::media(id.as_str())).await?;
        match raw {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overwrites the whole record. There is no partial update; callers
    /// always publish a complete record.
    pub async fn put(&self, record: &MediaRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.kv.set(&keys::media(&record.video_id), &bytes).await
    }
}
