//! jup-arb - Solana round-trip arbitrage executor
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

#[cfg(test)]
pub(crate) mod testing;

pub use application::{DecisionEngine, StateRefresher};
pub use domain::execution::{LookupTableCache, TransactionAssembler};
pub use infrastructure::broadcast::Broadcaster;
pub use infrastructure::subscription::SubscriptionTracker;
