//! Shared components - common types, errors, snapshots and utilities

pub mod errors;
pub mod state;
pub mod types;
pub mod utils;
