//! Go/no-go decision for a pair of opposite-direction quotes

use serde::{Deserialize, Serialize};
use std::fmt;

use super::fee_tier::{select_priority_fee, tier_for_profit, PriorityTier, TierCeilings, TierThresholds};
use super::quote::QuoteLeg;
use crate::shared::types::PriorityFeeLevels;

/// Admissibility filters, each independently togglable
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub same_pool: bool,
    pub slot_latency: bool,
    pub slot_divergence: bool,
    pub max_slot_lag: u64,
    pub max_slot_divergence: u64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            same_pool: true,
            slot_latency: false,
            slot_divergence: false,
            max_slot_lag: 3,
            max_slot_divergence: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub filters: FilterConfig,
    /// May be negative for loss-tolerant test runs
    pub min_profit_ratio: f64,
    pub min_tip_lamports: u64,
    pub tip_fee_percentage: f64,
    pub thresholds: TierThresholds,
    pub ceilings: TierCeilings,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            filters: FilterConfig::default(),
            min_profit_ratio: 0.0,
            min_tip_lamports: 100_000,
            tip_fee_percentage: 0.0,
            thresholds: TierThresholds::default(),
            ceilings: TierCeilings::default(),
        }
    }
}

/// Point-in-time inputs of one evaluation
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub latest_slot: u64,
    pub trade_size: u64,
    pub fee_levels: Option<PriorityFeeLevels>,
}

/// Accepted opportunity, valid for one evaluation cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitrageCandidate {
    pub buy_price: f64,
    pub sell_price: f64,
    pub profit_ratio: f64,
    pub incentive_amount: u64,
    pub trade_size: u64,
    pub tier: PriorityTier,
    pub priority_fee: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    SamePool { pool: String },
    StaleQuote { latest_slot: u64, quote0_slot: u64, quote1_slot: u64 },
    SlotDivergence { diff: u64, limit: u64 },
    EmptyQuote,
    Unprofitable { profit_ratio: f64 },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::SamePool { pool } => write!(f, "same pool {}", pool),
            RejectReason::StaleQuote { latest_slot, quote0_slot, quote1_slot } => write!(
                f,
                "quote outdated (latest slot {}, quote0 slot {}, quote1 slot {})",
                latest_slot, quote0_slot, quote1_slot
            ),
            RejectReason::SlotDivergence { diff, limit } => {
                write!(f, "contextSlot difference {} exceeds {}", diff, limit)
            }
            RejectReason::EmptyQuote => f.write_str("zero amount in quote"),
            RejectReason::Unprofitable { profit_ratio } => {
                write!(f, "profit ratio {:.6} below threshold", profit_ratio)
            }
        }
    }
}

/// Apply the filters in order, then the profitability test.
pub fn evaluate(
    leg0: &QuoteLeg,
    leg1: &QuoteLeg,
    ctx: &EvaluationContext,
    config: &DecisionConfig,
) -> Result<ArbitrageCandidate, RejectReason> {
    let filters = &config.filters;

    if filters.same_pool {
        if let (Some(pool0), Some(pool1)) = (leg0.pool_key(), leg1.pool_key()) {
            if pool0 == pool1 {
                return Err(RejectReason::SamePool { pool: pool0.to_string() });
            }
        }
    }

    if filters.slot_latency {
        let floor = ctx.latest_slot.saturating_sub(filters.max_slot_lag);
        if leg0.context_slot < floor || leg1.context_slot < floor {
            return Err(RejectReason::StaleQuote {
                latest_slot: ctx.latest_slot,
                quote0_slot: leg0.context_slot,
                quote1_slot: leg1.context_slot,
            });
        }
    }

    if filters.slot_divergence {
        let diff = leg0.context_slot.abs_diff(leg1.context_slot);
        if diff > filters.max_slot_divergence {
            return Err(RejectReason::SlotDivergence {
                diff,
                limit: filters.max_slot_divergence,
            });
        }
    }

    if leg0.out_amount == 0 || leg1.in_amount == 0 {
        return Err(RejectReason::EmptyQuote);
    }

    let buy_price = leg0.in_amount as f64 / leg0.out_amount as f64;
    let sell_price = leg1.out_amount as f64 / leg1.in_amount as f64;
    let profit_ratio = sell_price / buy_price - 1.0;

    if profit_ratio <= config.min_profit_ratio {
        return Err(RejectReason::Unprofitable { profit_ratio });
    }

    let incentive_amount = incentive_for(
        profit_ratio,
        ctx.trade_size,
        config.tip_fee_percentage,
        config.min_tip_lamports,
    );
    let tier = tier_for_profit(profit_ratio, &config.thresholds);
    let priority_fee = select_priority_fee(ctx.fee_levels.as_ref(), tier, &config.ceilings);

    Ok(ArbitrageCandidate {
        buy_price,
        sell_price,
        profit_ratio,
        incentive_amount,
        trade_size: ctx.trade_size,
        tier,
        priority_fee,
    })
}

/// max(min_tip, floor(profit_ratio * trade_size * fee_percentage))
pub fn incentive_for(profit_ratio: f64, trade_size: u64, fee_percentage: f64, min_tip: u64) -> u64 {
    let share = (profit_ratio * trade_size as f64 * fee_percentage).floor();
    if share.is_finite() && share > min_tip as f64 {
        share as u64
    } else {
        min_tip
    }
}
