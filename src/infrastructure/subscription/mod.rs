//! Confirmation and account-change tracking over the pub/sub websocket

pub mod book;
pub mod protocol;
pub mod tracker;

pub use book::{BookSettings, SubscriptionBook, SubscriptionStatus};
pub use tracker::{AccountChange, OutboundQueue, SubscriptionRegistry, SubscriptionTracker, TrackerSettings};
