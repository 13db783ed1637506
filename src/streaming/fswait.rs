//! Bounded polling against the cache filesystem.
//!
//! Providers wait on files the encoder has not written yet; every wait is
//! hard-deadlined so a stalled build turns into a NotReady error instead of
//! a hung request.

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::streaming::paths::is_segment_name;

/// Wait until `path` exists, polling every `poll`, for at most `timeout`.
pub async fn wait_for_file(path: &Path, timeout: Duration, poll: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match tokio::fs::try_exists(path).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) => return Err(e.into()),
        }
        if Instant::now() >= deadline {
            return Err(Error::NotReady);
        }
        tokio::time::sleep(poll).await;
    }
}

/// Segment files currently present in `dir`, sorted by name (and therefore by
/// index). A missing directory is simply an empty listing.
pub async fn list_segments(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if is_segment_name(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
