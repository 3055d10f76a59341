//! Output-file resolution.
//!
//! The retrieval tool decides the extension, may retry internally, and may
//! leave stale zero-byte files from earlier failed runs, so the file that
//! "actually completed" has to be discovered after the fact: newest
//! modification time among non-empty candidates sharing the
//! `<id>.<kind>.` prefix.

use crate::error::Result;
use crate::ids::VideoId;
use crate::retriever::StreamKind;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Lists every file in the flat media directory matching `<id>.<kind>.*`.
/// A missing directory yields no candidates rather than an error; the job
/// turns an empty result into its own failure.
pub fn candidate_paths(media_root: &Path, id: &VideoId, kind: StreamKind) -> Result<Vec<PathBuf>> {
    let prefix = format!("{}.{}.", id.as_str(), kind.as_str());
    let mut candidates = Vec::new();

    let entries = match fs::read_dir(media_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(candidates),
        Err(err) => return Err(err.into()),
    };

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with(&prefix) {
            candidates.push(entry.path());
        }
    }

    Ok(candidates)
}

/// Picks the most recently modified non-empty regular file, or `None` when
/// nothing survives filtering. Unreadable candidates are skipped rather
/// than failing the whole resolution.
pub fn pick_newest_nonempty(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(SystemTime, PathBuf)> = None;

    for path in paths {
        let Ok(meta) = fs::metadata(path) else {
            continue;
        };
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        match &best {
            Some((newest, _)) if *newest >= modified => {}
            _ => best = Some((modified, path.clone())),
        }
    }

    best.map(|(_, path)| path)
}
