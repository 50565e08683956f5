//! Transfer store
//!
//! Owns the identifier → entry map. Each entry carries the transfer record
//! and the watchers waiting on it, so a record and its watcher list are
//! always added, read, and removed under the same shard lock:
//!
//! - `consume` and `expire` remove the whole entry in one step, so exactly
//!   one of them wins and the loser sees nothing.
//! - `subscribe` either appends to a live entry or, if the entry is gone,
//!   tells the watcher so right away. There is no window in which a watcher
//!   can attach to a removed transfer.
//! - Fan-out runs on the removed entry after the lock is released.
//!
//! The store is a cheap clonable handle; construct it once at startup and
//! pass it to whatever needs it.

use crate::error::{Result, StoreError};
use crate::expiry::ExpiryScheduler;
use crate::id::TransferId;
use crate::record::TransferRecord;
use crate::watcher::{
    Notification, NotificationSink, TransferEvent, WatcherKey, WatcherList, deliver_all,
};
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Record plus the watchers interested in it
struct Entry {
    record: TransferRecord,
    watchers: WatcherList,
}

/// Shared state behind every [`TransferStore`] clone
pub(crate) struct StoreState {
    entries: DashMap<TransferId, Entry>,
}

impl StoreState {
    /// Remove `id`, notify its watchers, and delete its bytes
    ///
    /// Returns `false` if the transfer was already consumed or expired.
    pub(crate) async fn expire(&self, id: &TransferId) -> bool {
        let Some((_, Entry { record, watchers })) = self.entries.remove(id) else {
            tracing::debug!("Expiry for {} skipped: already removed", id);
            return false;
        };

        let notified = watchers.fan_out(&Notification::new(TransferEvent::Expired, *id));
        discard_bytes(&record.location).await;

        tracing::info!(
            "Transfer {} expired after {:?} ({} watcher(s) notified)",
            id,
            record.ttl,
            notified
        );
        true
    }
}

/// Outcome of [`TransferStore::subscribe`]
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Watcher attached; pass the key to `unsubscribe`
    Active(WatcherKey),
    /// Transfer was not live; the watcher already received a `gone` event
    Gone,
}

impl Subscription {
    /// Key for an active subscription
    pub fn key(&self) -> Option<WatcherKey> {
        match self {
            Self::Active(key) => Some(*key),
            Self::Gone => None,
        }
    }
}

/// In-memory registry of pending one-time transfers
///
/// Thread-safe and designed for concurrent access from upload, download,
/// watcher, and timer tasks.
#[derive(Clone)]
pub struct TransferStore {
    state: Arc<StoreState>,
    scheduler: ExpiryScheduler,
    default_ttl: Duration,
}

impl TransferStore {
    /// Create an empty store whose timers run on the current Tokio runtime
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_scheduler(default_ttl, ExpiryScheduler::current())
    }

    /// Create an empty store with an explicit scheduler
    pub fn with_scheduler(default_ttl: Duration, scheduler: ExpiryScheduler) -> Self {
        Self {
            state: Arc::new(StoreState {
                entries: DashMap::new(),
            }),
            scheduler,
            default_ttl,
        }
    }

    /// TTL used by [`register_default`](Self::register_default)
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Expiry scheduler backing this store
    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    /// Register bytes already written to `location` and arm a TTL timer
    ///
    /// # Arguments
    ///
    /// * `location` - Where the uploaded bytes live
    /// * `display_name` - Original filename (may be empty)
    /// * `ttl` - How long the transfer stays claimable
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EntropyUnavailable`] if no identifier could be
    /// generated. Nothing is inserted in that case.
    pub fn register(
        &self,
        location: impl Into<PathBuf>,
        display_name: impl Into<String>,
        ttl: Duration,
    ) -> Result<TransferId> {
        let id = TransferId::generate().inspect_err(|e| {
            tracing::error!("Cannot register transfer: {}", e);
        })?;

        let record = TransferRecord::new(id, location.into(), display_name.into(), ttl);
        tracing::debug!(
            "Registered transfer {} at {} (ttl {:?})",
            id,
            record.location.display(),
            ttl
        );

        self.state.entries.insert(
            id,
            Entry {
                record,
                watchers: WatcherList::new(),
            },
        );
        self.scheduler.schedule(id, ttl, Arc::downgrade(&self.state));

        Ok(id)
    }

    /// Register with the store's default TTL
    ///
    /// # Errors
    ///
    /// Same as [`register`](Self::register).
    pub fn register_default(
        &self,
        location: impl Into<PathBuf>,
        display_name: impl Into<String>,
    ) -> Result<TransferId> {
        self.register(location, display_name, self.default_ttl)
    }

    /// Look up a live transfer without changing anything
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the transfer isn't live.
    pub fn get(&self, id: &TransferId) -> Result<TransferRecord> {
        self.state
            .entries
            .get(id)
            .map(|entry| entry.record.clone())
            .ok_or(StoreError::NotFound(*id))
    }

    /// Take the transfer for download
    ///
    /// Removes the record and hands it to the caller, who becomes
    /// responsible for streaming and then deleting the bytes at
    /// `record.location`. Watchers get a `delivered` event once the record
    /// is gone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the transfer was never registered
    /// or has already been consumed or expired.
    pub fn consume(&self, id: &TransferId) -> Result<TransferRecord> {
        let (_, Entry { record, watchers }) = self
            .state
            .entries
            .remove(id)
            .ok_or(StoreError::NotFound(*id))?;

        let notified = watchers.fan_out(&Notification::new(TransferEvent::Delivered, *id));
        tracing::info!(
            "Transfer {} consumed ({} watcher(s) notified)",
            id,
            notified
        );

        Ok(record)
    }

    /// Expire the transfer now, deleting its bytes
    ///
    /// Normally called by the expiry timer. Returns `false` without side
    /// effects if the transfer was already consumed or expired.
    pub async fn expire(&self, id: &TransferId) -> bool {
        self.state.expire(id).await
    }

    /// Attach a watcher to a transfer
    ///
    /// If the transfer is not live the watcher is sent a `gone` event
    /// immediately instead of being registered.
    pub fn subscribe(&self, id: &TransferId, sink: Arc<dyn NotificationSink>) -> Subscription {
        if let Some(mut entry) = self.state.entries.get_mut(id) {
            let key = entry.watchers.push(sink);
            tracing::debug!("Watcher {:?} attached to {}", key, id);
            return Subscription::Active(key);
        }

        if let Err(e) = sink.deliver(&Notification::new(TransferEvent::Gone, *id)) {
            tracing::debug!("Late watcher for {} unreachable: {}", id, e);
        }
        Subscription::Gone
    }

    /// Detach a watcher; `false` if it was not attached
    pub fn unsubscribe(&self, id: &TransferId, key: WatcherKey) -> bool {
        self.state
            .entries
            .get_mut(id)
            .is_some_and(|mut entry| entry.watchers.remove(key))
    }

    /// Send a non-terminal `message` event to the transfer's current watchers
    ///
    /// Returns how many watchers accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the transfer isn't live.
    pub fn broadcast(&self, id: &TransferId, detail: serde_json::Value) -> Result<usize> {
        let sinks = self
            .state
            .entries
            .get(id)
            .map(|entry| entry.watchers.snapshot())
            .ok_or(StoreError::NotFound(*id))?;

        Ok(deliver_all(&sinks, &Notification::message(*id, detail)))
    }

    /// Number of watchers on a live transfer (zero if not live)
    pub fn watcher_count(&self, id: &TransferId) -> usize {
        self.state
            .entries
            .get(id)
            .map_or(0, |entry| entry.watchers.len())
    }

    /// Number of live transfers
    pub fn len(&self) -> usize {
        self.state.entries.len()
    }

    /// Whether there are no live transfers
    pub fn is_empty(&self) -> bool {
        self.state.entries.is_empty()
    }
}

/// Delete expired bytes; a missing file is fine, anything else is logged
async fn discard_bytes(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
