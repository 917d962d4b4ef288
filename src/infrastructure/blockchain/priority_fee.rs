//! Priority fee estimates from the `qn_estimatePriorityFees` JSON-RPC method

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::shared::errors::AppError;
use crate::shared::types::PriorityFeeLevels;

/// Jupiter aggregator program, the account fees are estimated against
pub const JUPITER_PROGRAM: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

#[async_trait]
pub trait PriorityFeeOracle: Send + Sync {
    async fn estimate(&self) -> Result<PriorityFeeLevels, AppError>;
}

pub struct QuickNodeFeeOracle {
    client: Client,
    url: String,
    last_n_blocks: u32,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<FeeEstimate>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct FeeEstimate {
    per_compute_unit: PerComputeUnit,
}

#[derive(Debug, Deserialize)]
struct PerComputeUnit {
    extreme: f64,
    high: f64,
    medium: f64,
    low: f64,
}

impl QuickNodeFeeOracle {
    pub fn new(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            url,
            last_n_blocks: 100,
        }
    }
}

#[async_trait]
impl PriorityFeeOracle for QuickNodeFeeOracle {
    async fn estimate(&self) -> Result<PriorityFeeLevels, AppError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "qn_estimatePriorityFees",
            "params": {
                "last_n_blocks": self.last_n_blocks,
                "account": JUPITER_PROGRAM,
                "api_version": 2,
            }
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::BlockchainError(format!("Priority fee request failed: {}", e)))?;

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| AppError::BlockchainError(format!("Invalid priority fee response: {}", e)))?;

        parse_envelope(envelope)
    }
}

fn parse_envelope(envelope: RpcEnvelope) -> Result<PriorityFeeLevels, AppError> {
    if let Some(err) = envelope.error {
        return Err(AppError::BlockchainError(format!("Priority fee RPC error: {}", err)));
    }
    let estimate = envelope
        .result
        .ok_or_else(|| AppError::BlockchainError("Priority fee response has no result".to_string()))?;
    let per_cu = estimate.per_compute_unit;
    Ok(PriorityFeeLevels {
        extreme: to_micro_lamports(per_cu.extreme),
        high: to_micro_lamports(per_cu.high),
        medium: to_micro_lamports(per_cu.medium),
        low: to_micro_lamports(per_cu.low),
    })
}

fn to_micro_lamports(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.round() as u64
    } else {
        0
    }
}
