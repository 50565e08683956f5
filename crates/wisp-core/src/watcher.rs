//! Watcher bookkeeping and notification fan-out
//!
//! A watcher is any party that wants to hear when a transfer is delivered or
//! expires. The registry holds a non-owning handle ([`NotificationSink`]);
//! closing the underlying connection stays with the watcher.
//!
//! # Wire shape
//!
//! ```text
//! { "event": "delivered" | "expired" | "gone" | "message", "identifier": "<hex>" }
//! ```
//!
//! `message` events come from [`TransferStore::broadcast`](crate::TransferStore::broadcast)
//! and carry an extra `detail` field.

use crate::error::DeliveryError;
use crate::id::TransferId;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// What happened to a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferEvent {
    /// The file was downloaded
    Delivered,
    /// The file outlived its TTL
    Expired,
    /// The transfer was already gone when the watcher subscribed
    Gone,
    /// Non-terminal signal sent via broadcast
    Message,
}

impl TransferEvent {
    /// Terminal events end the watch; nothing follows them
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Message)
    }
}

/// Event delivered to watchers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Event kind
    pub event: TransferEvent,
    /// Transfer the event concerns
    pub identifier: TransferId,
    /// Free-form payload for `message` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl Notification {
    /// Notification without payload
    pub fn new(event: TransferEvent, identifier: TransferId) -> Self {
        Self {
            event,
            identifier,
            detail: None,
        }
    }

    /// Non-terminal notification carrying `detail`
    pub fn message(identifier: TransferId, detail: serde_json::Value) -> Self {
        Self {
            event: TransferEvent::Message,
            identifier,
            detail: Some(detail),
        }
    }
}

/// Channel the store writes notifications to
///
/// `deliver` is called outside every store lock but still on the caller's
/// task, so it must not block.
pub trait NotificationSink: Send + Sync {
    /// Hand one notification to the watcher
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] if the watcher can no longer accept events.
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Sink backed by an unbounded Tokio channel
///
/// The receiving half is typically drained by a connection task that owns
/// the actual socket.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    /// Wrap an existing sender
    pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx }
    }

    /// Create a sink and its receiving half
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| DeliveryError::Closed)
    }
}

/// Handle returned by subscribe, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherKey(u64);

impl WatcherKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Watchers attached to one transfer
///
/// Watcher counts are small, so removal is a linear scan.
#[derive(Default)]
pub struct WatcherList {
    entries: Vec<(WatcherKey, Arc<dyn NotificationSink>)>,
}

impl WatcherList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a watcher and return its key
    pub fn push(&mut self, sink: Arc<dyn NotificationSink>) -> WatcherKey {
        let key = WatcherKey::next();
        self.entries.push((key, sink));
        key
    }

    /// Remove the watcher with `key`; `false` if it wasn't here
    pub fn remove(&mut self, key: WatcherKey) -> bool {
        match self.entries.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Number of watchers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no one is watching
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone the sink handles so delivery can happen after the lock is released
    pub fn snapshot(&self) -> Vec<Arc<dyn NotificationSink>> {
        self.entries.iter().map(|(_, s)| Arc::clone(s)).collect()
    }

    /// Deliver `notification` to every watcher and discard the list
    ///
    /// Returns how many deliveries succeeded.
    pub fn fan_out(self, notification: &Notification) -> usize {
        deliver_all(self.entries.iter().map(|(_, s)| s), notification)
    }
}

impl fmt::Debug for WatcherList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherList")
            .field("len", &self.entries.len())
            .finish()
    }
}

/// Best-effort delivery; one failing watcher never stops the rest
pub(crate) fn deliver_all<'a>(
    sinks: impl IntoIterator<Item = &'a Arc<dyn NotificationSink>>,
    notification: &Notification,
) -> usize {
    let mut delivered = 0;
    for sink in sinks {
        match sink.deliver(notification) {
            Ok(()) => delivered += 1,
            Err(e) => tracing::debug!(
                "Skipping watcher for {}: {}",
                notification.identifier,
                e
            ),
        }
    }
    delivered
}
