//! Startup sweep of orphaned upload bytes
//!
//! The transfer store is purely in-memory, so files uploaded before a restart
//! can no longer be downloaded. This pass runs once before the store is built
//! and removes any of them older than the TTL.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Remove regular files in `dir` whose modification time is older than `max_age`
///
/// Does not recurse. Per-file failures are logged and skipped.
///
/// # Errors
///
/// Returns an error only if `dir` itself cannot be read.
pub async fn remove_stale_files(dir: &Path, max_age: Duration) -> io::Result<usize> {
    tracing::info!(
        "Sweeping {} for files older than {:?}",
        dir.display(),
        max_age
    );

    let mut entries = tokio::fs::read_dir(dir).await?;
    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age <= max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Removed stale file {} (age {:?})", path.display(), age);
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to remove stale file {}: {}", path.display(), e),
        }
    }

    tracing::info!("Sweep complete, removed {} file(s)", removed);
    Ok(removed)
}
