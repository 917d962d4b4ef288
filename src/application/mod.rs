//! Application layer - snapshot refresh and the decision loop

pub mod engine;
pub mod refresher;

pub use engine::{CycleOutcome, DecisionEngine, EngineSettings};
pub use refresher::{spawn_lookup_refresh, RefreshIntervals, StateRefresher};
