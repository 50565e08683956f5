//! Per-transfer metadata

use crate::id::TransferId;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Data held for one in-flight transfer
///
/// Immutable once registered. The store owns `location` until the record is
/// consumed; after that, deleting the bytes is the consumer's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    /// Public identifier, the sole lookup key
    pub id: TransferId,
    /// Where the uploaded bytes live
    pub location: PathBuf,
    /// Original filename, may be empty
    pub display_name: String,
    /// When the record was registered
    pub created_at: SystemTime,
    /// Time-to-live armed at registration
    pub ttl: Duration,
}

impl TransferRecord {
    /// Create a record stamped with the current time
    pub fn new(id: TransferId, location: PathBuf, display_name: String, ttl: Duration) -> Self {
        Self {
            id,
            location,
            display_name,
            created_at: SystemTime::now(),
            ttl,
        }
    }

    /// Name to offer the downloader: the display name, or the identifier when empty
    pub fn download_name(&self) -> String {
        if self.display_name.is_empty() {
            self.id.to_string()
        } else {
            self.display_name.clone()
        }
    }
}
