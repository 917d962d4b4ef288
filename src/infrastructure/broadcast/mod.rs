//! Outbound delivery to direct RPC nodes and bundle relays

pub mod broadcaster;
pub mod bundle_relay;
pub mod rpc_sender;

pub use broadcaster::{Broadcaster, SendContext, SendOutcome};
pub use bundle_relay::{BundleRelay, JitoRelay};
pub use rpc_sender::{RpcNodeSender, TransactionSender};
