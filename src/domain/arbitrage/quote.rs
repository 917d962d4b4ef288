//! Quote legs as returned by the quoting service, and the round-trip merge

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Swap direction semantics of a quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapMode {
    ExactIn,
    ExactOut,
}

impl SwapMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapMode::ExactIn => "ExactIn",
            SwapMode::ExactOut => "ExactOut",
        }
    }
}

/// Parameters of one quote request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
    pub swap_mode: SwapMode,
    pub slippage_bps: u16,
    pub only_direct_routes: bool,
    pub max_accounts: Option<u8>,
}

/// Venue details of one route step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    #[serde(with = "amount_string")]
    pub in_amount: u64,
    #[serde(with = "amount_string")]
    pub out_amount: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    #[serde(default = "full_percent")]
    pub percent: u8,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn full_percent() -> u8 {
    100
}

/// One directional quote. Fields the engine does not inspect are kept in
/// `extra` so the quote can be sent back to the builder unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteLeg {
    pub input_mint: String,
    #[serde(with = "amount_string")]
    pub in_amount: u64,
    pub output_mint: String,
    #[serde(with = "amount_string")]
    pub out_amount: u64,
    #[serde(with = "amount_string")]
    pub other_amount_threshold: u64,
    pub swap_mode: SwapMode,
    #[serde(default)]
    pub slippage_bps: u16,
    #[serde(default)]
    pub price_impact_pct: String,
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(default)]
    pub context_slot: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuoteLeg {
    /// Liquidity pool of the first route step
    pub fn pool_key(&self) -> Option<&str> {
        self.route_plan.first().map(|step| step.swap_info.amm_key.as_str())
    }
}

/// Merge two legs into one circular quote: leg0's route followed by leg1's,
/// ending in leg1's output asset and demanding at least `min_out` back.
pub fn merge_legs(leg0: &QuoteLeg, leg1: &QuoteLeg, min_out: u64) -> QuoteLeg {
    let mut merged = leg0.clone();
    merged.output_mint = leg1.output_mint.clone();
    merged.out_amount = min_out;
    merged.other_amount_threshold = min_out;
    merged.price_impact_pct = "0".to_string();
    merged.route_plan.extend(leg1.route_plan.iter().cloned());
    merged
}

/// u64 amounts travel as decimal strings on the wire
pub mod amount_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse::<u64>().map_err(de::Error::custom),
            Value::Number(n) => n
                .as_u64()
                .ok_or_else(|| de::Error::custom(format!("amount out of range: {}", n))),
            other => Err(de::Error::custom(format!("unexpected amount: {}", other))),
        }
    }
}
