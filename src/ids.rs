//! Validated video identifiers.
//!
//! An identifier is the sole key for locks, metadata records, and output
//! filenames, so it is validated once on construction and treated as opaque
//! everywhere else. Extraction of ids from arbitrary URL strings is the API
//! layer's problem, not ours.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a YouTube-style video id.
pub const VIDEO_ID_LEN: usize = 11;

/// An 11-character token over `[A-Za-z0-9_-]` naming one logical media unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VideoId(String);

impl VideoId {
    pub fn new(raw: impl Into<String>) -> Result<Self> {
        let raw = raw.into();
        let valid = raw.len() == VIDEO_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if valid {
            Ok(Self(raw))
        } else {
            Err(CacheError::InvalidVideoId(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical source URL handed to the retrieval tool.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for VideoId {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<VideoId> for String {
    fn from(id: VideoId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_ids() {
        let id = VideoId::new("abc12345678").unwrap();
        assert_eq!(id.as_str(), "abc12345678");
        assert_eq!(VideoId::new("a-b_c456789").unwrap().to_string(), "a-b_c456789");
    }

    #[test]
    fn rejects_bad_length_and_characters() {
        assert!(VideoId::new("short").is_err());
        assert!(VideoId::new("twelve-chars").is_err());
        assert!(VideoId::new("abc1234567/").is_err());
        assert!(VideoId::new("").is_err());
    }

    #[test]
    fn builds_canonical_watch_url() {
        let id = VideoId::new("abc12345678").unwrap();
        assert_eq!(id.watch_url(), "https://www.youtube.com/watch?v=abc12345678");
    }

    #[test]
    fn serde_round_trip_validates() {
        let id: VideoId = serde_json::from_str("\"abc12345678\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc12345678\"");
        assert!(serde_json::from_str::<VideoId>("\"nope\"").is_err());
    }
}
