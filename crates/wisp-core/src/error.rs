//! Error types for the transfer store

use crate::id::TransferId;
use thiserror::Error;

/// Errors surfaced by [`TransferStore`](crate::TransferStore) operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// No live transfer for this identifier (never registered, consumed, or expired)
    #[error("Transfer not found: {0}")]
    NotFound(TransferId),

    /// The OS randomness source could not produce an identifier
    #[error("Entropy source unavailable: {0}")]
    EntropyUnavailable(String),
}

impl StoreError {
    /// Whether this is the expected "already gone" outcome rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A single watcher rejected a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The receiving side of the watcher channel is gone
    #[error("Watcher channel closed")]
    Closed,
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
