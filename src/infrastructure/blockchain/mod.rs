//! Ledger reads and fee estimates for Solana

pub mod ledger;
pub mod priority_fee;

pub use ledger::{LedgerReader, LookupTableSnapshot, SolanaLedger};
pub use priority_fee::{PriorityFeeOracle, QuickNodeFeeOracle};
