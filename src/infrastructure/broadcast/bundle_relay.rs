//! Bundle submission to Jito block-engine relays

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;

use crate::shared::errors::DeliveryError;

const BUNDLES_PATH: &str = "/api/v1/bundles";

#[async_trait]
pub trait BundleRelay: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Submit `transactions` as one bundle, returning the relay's bundle id
    async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String, DeliveryError>;
}

#[derive(Debug, Deserialize)]
struct RelayError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BundleResponse {
    result: Option<String>,
    error: Option<RelayError>,
}

pub struct JitoRelay {
    endpoint: String,
    client: Client,
}

impl JitoRelay {
    pub fn new(endpoint: impl Into<String>, client: Client) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn default_client() -> Client {
        Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new())
    }

    fn relay_error(&self, reason: impl Into<String>) -> DeliveryError {
        DeliveryError::Relay {
            endpoint: self.endpoint.clone(),
            reason: reason.into(),
        }
    }
}

/// Base58 wire encoding of each transaction
pub fn encode_bundle(transactions: &[VersionedTransaction]) -> Result<Vec<String>, DeliveryError> {
    transactions
        .iter()
        .map(|tx| {
            bincode::serialize(tx)
                .map(|bytes| bs58::encode(bytes).into_string())
                .map_err(|e| DeliveryError::Encoding(e.to_string()))
        })
        .collect()
}

#[async_trait]
impl BundleRelay for JitoRelay {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String, DeliveryError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encode_bundle(transactions)?],
        });

        let url = format!("{}{}", self.endpoint, BUNDLES_PATH);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.relay_error(e.to_string()))?;

        let status = response.status();
        let body: BundleResponse = response
            .json()
            .await
            .map_err(|e| self.relay_error(format!("status {}: {}", status, e)))?;

        if let Some(error) = body.error {
            return Err(self.relay_error(error.message));
        }
        body.result.ok_or_else(|| self.relay_error("empty result"))
    }
}
