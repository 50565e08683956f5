//! One-shot expiry timers
//!
//! Every registered transfer gets a Tokio task that sleeps for the TTL and
//! then asks the store to expire it. Timers are never cancelled: one that
//! fires after the transfer was consumed finds nothing and does nothing.

use crate::id::TransferId;
use crate::store::StoreState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;

/// Spawns expiry timers on a Tokio runtime
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    handle: Handle,
    armed: Arc<AtomicUsize>,
}

impl ExpiryScheduler {
    /// Schedule timers on the given runtime
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            armed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Schedule timers on the runtime this is called from
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Timers that have not fired yet
    pub fn armed(&self) -> usize {
        self.armed.load(Ordering::Relaxed)
    }

    /// Arm a timer that expires `id` after `ttl`
    ///
    /// Holds only a weak reference so a dropped store is not kept alive by
    /// its pending timers.
    pub(crate) fn schedule(&self, id: TransferId, ttl: Duration, store: Weak<StoreState>) {
        let armed = Arc::clone(&self.armed);
        armed.fetch_add(1, Ordering::Relaxed);

        self.handle.spawn(async move {
            tokio::time::sleep(ttl).await;
            armed.fetch_sub(1, Ordering::Relaxed);

            match store.upgrade() {
                Some(state) => {
                    state.expire(&id).await;
                }
                None => tracing::trace!("Store dropped before timer for {} fired", id),
            }
        });
    }
}
