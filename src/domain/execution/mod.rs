//! Execution domain - blockhash window, lookup tables and transaction assembly

pub mod assembler;
pub mod blockhash_window;
pub mod lookup_cache;

pub use assembler::{AssembledBatch, TransactionAssembler};
pub use blockhash_window::BlockhashWindow;
pub use lookup_cache::LookupTableCache;
