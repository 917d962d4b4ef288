//! Arbitrage domain - quote legs, filters, profitability and fee strategy

pub mod decision;
pub mod fee_tier;
pub mod quote;

pub use decision::{evaluate, ArbitrageCandidate, DecisionConfig, EvaluationContext, FilterConfig, RejectReason};
pub use fee_tier::{PriorityTier, TierCeilings, TierThresholds};
pub use quote::{merge_legs, QuoteLeg, QuoteRequest, SwapMode};
