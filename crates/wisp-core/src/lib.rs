//! # Wisp Core
//!
//! In-memory registry of pending one-time transfers.
//!
//! This crate provides:
//! - Unguessable 128-bit transfer identifiers
//! - Consume-once transfer records keyed by identifier
//! - One-shot expiry timers driven by Tokio
//! - Per-transfer watcher lists with delivery/expiry fan-out
//!
//! # Lifecycle
//!
//! ```text
//! absent --register--> registered --consume--> (delivered) --> absent forever
//!                                 \--expire---> (expired)   --> absent forever
//! ```
//!
//! Exactly one of `consume` or `expire` wins for a given identifier. The loser
//! observes [`StoreError::NotFound`] (or `false` for `expire`) and does nothing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod expiry;
pub mod id;
pub mod record;
pub mod store;
pub mod watcher;

pub use error::{DeliveryError, Result, StoreError};
pub use expiry::ExpiryScheduler;
pub use id::{ParseIdError, TransferId};
pub use record::TransferRecord;
pub use store::{Subscription, TransferStore};
pub use watcher::{ChannelSink, Notification, NotificationSink, TransferEvent, WatcherKey};

use std::time::Duration;

/// Default time-to-live for an unclaimed transfer (10 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
