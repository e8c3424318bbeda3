//! Event log (WAL) and reactive subscription dispatch for Nexus.
//!
//! Tuple and filesystem mutations are appended durably via
//! [`wal::EventSink`] before they are considered committed, then published
//! to the [`subscription::SubscriptionManager`] so connected clients observe
//! them in commit order.

#![warn(missing_docs)]

pub mod event;
pub mod subscription;
pub mod wal;

pub use event::Event;
pub use subscription::{BatchUpdate, Subscription, SubscriptionManager, SubscriptionMode, UpdateRef};
pub use wal::{replay_dir, EventSink, RelationalFallbackSink, WalWriter};
