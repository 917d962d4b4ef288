//! Common types used across the application

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::str::FromStr;

/// Wrapped SOL mint, the default base asset
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Tradeable asset reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradePair {
    pub symbol: String,
    pub mint: String,
}

impl TradePair {
    pub fn new(symbol: impl Into<String>, mint: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            mint: mint.into(),
        }
    }

    pub fn mint_pubkey(&self) -> Result<Pubkey, solana_sdk::pubkey::ParsePubkeyError> {
        Pubkey::from_str(&self.mint)
    }
}

impl fmt::Display for TradePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbol)
    }
}

/// Per-compute-unit fee estimates for the four oracle levels (micro-lamports)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriorityFeeLevels {
    pub extreme: u64,
    pub high: u64,
    pub medium: u64,
    pub low: u64,
}

/// Where an outbound transaction was delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    Rpc,
    Relay,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Rpc => "rpc",
            ChannelKind::Relay => "relay",
        }
    }
}

/// Which destination classes a batch goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    RpcOnly,
    RelayOnly,
    Both,
}

impl DeliveryMode {
    pub fn from_flags(send_to_both: bool, send_by_bundle: bool) -> Self {
        if send_to_both {
            DeliveryMode::Both
        } else if send_by_bundle {
            DeliveryMode::RelayOnly
        } else {
            DeliveryMode::RpcOnly
        }
    }

    /// Incentive-bearing variants are only needed when relays are in play
    pub fn uses_relays(&self) -> bool {
        matches!(self, DeliveryMode::RelayOnly | DeliveryMode::Both)
    }

    pub fn uses_rpc(&self) -> bool {
        matches!(self, DeliveryMode::RpcOnly | DeliveryMode::Both)
    }
}

/// Durable record of one successful send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRecord {
    pub signature: String,
    pub start_slot: u64,
    pub endpoint: String,
    pub quote0_slot: Option<u64>,
    pub quote1_slot: Option<u64>,
}

/// Durable record of a confirmation subscription's lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub signature: String,
    pub land_slot: Option<u64>,
    pub status: String,
}
