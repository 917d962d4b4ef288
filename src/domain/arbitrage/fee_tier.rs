//! Priority tier bucketing and fee selection

use serde::{Deserialize, Serialize};

use crate::shared::types::PriorityFeeLevels;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PriorityTier {
    Low,
    Medium,
    High,
    Extreme,
}

impl PriorityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriorityTier::Low => "low",
            PriorityTier::Medium => "medium",
            PriorityTier::High => "high",
            PriorityTier::Extreme => "extreme",
        }
    }
}

/// Lower bounds of each tier, as profit ratios
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierThresholds {
    pub extreme: f64,
    pub high: f64,
    pub medium: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            extreme: 0.05,
            high: 0.02,
            medium: 0.01,
        }
    }
}

/// Fee ceiling per tier (micro-lamports per compute unit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCeilings {
    pub max_extreme: u64,
    pub max_high: u64,
    pub max_medium: u64,
    pub max_low: u64,
}

impl Default for TierCeilings {
    fn default() -> Self {
        Self {
            max_extreme: 45_678,
            max_high: 34_567,
            max_medium: 23_456,
            max_low: 12_345,
        }
    }
}

impl TierCeilings {
    pub fn for_tier(&self, tier: PriorityTier) -> u64 {
        match tier {
            PriorityTier::Extreme => self.max_extreme,
            PriorityTier::High => self.max_high,
            PriorityTier::Medium => self.max_medium,
            PriorityTier::Low => self.max_low,
        }
    }
}

pub fn tier_for_profit(profit_ratio: f64, thresholds: &TierThresholds) -> PriorityTier {
    if profit_ratio >= thresholds.extreme {
        PriorityTier::Extreme
    } else if profit_ratio >= thresholds.high {
        PriorityTier::High
    } else if profit_ratio >= thresholds.medium {
        PriorityTier::Medium
    } else {
        PriorityTier::Low
    }
}

/// Effective compute-unit price: the oracle's estimate for the tier, capped
/// by the tier ceiling. Without an estimate the ceiling is used.
pub fn select_priority_fee(
    estimate: Option<&PriorityFeeLevels>,
    tier: PriorityTier,
    ceilings: &TierCeilings,
) -> u64 {
    let ceiling = ceilings.for_tier(tier);
    match estimate {
        Some(levels) => {
            let estimated = match tier {
                PriorityTier::Extreme => levels.extreme,
                PriorityTier::High => levels.high,
                PriorityTier::Medium => levels.medium,
                PriorityTier::Low => levels.low,
            };
            estimated.min(ceiling)
        }
        None => ceiling,
    }
}
