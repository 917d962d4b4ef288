//! HTTP client for the Jupiter quote and swap-instructions endpoints

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use std::time::Duration;
use tracing::debug;

use super::{QuoteApiClient, SwapInstructions};
use crate::domain::arbitrage::quote::{QuoteLeg, QuoteRequest};
use crate::shared::errors::QuoteError;

pub struct JupiterClient {
    http_client: Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(5))
            .tcp_nodelay(true)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn quote_query(request: &QuoteRequest) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("inputMint", request.input_mint.clone()),
            ("outputMint", request.output_mint.clone()),
            ("amount", request.amount.to_string()),
            ("swapMode", request.swap_mode.as_str().to_string()),
            ("slippageBps", request.slippage_bps.to_string()),
            ("onlyDirectRoutes", request.only_direct_routes.to_string()),
        ];
        if let Some(max_accounts) = request.max_accounts {
            query.push(("maxAccounts", max_accounts.to_string()));
        }
        query
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, QuoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::RequestFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(QuoteError::BadStatus {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| QuoteError::InvalidPayload(format!("{}: {}", e, body)))
    }
}

#[async_trait]
impl QuoteApiClient for JupiterClient {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteLeg, QuoteError> {
        let url = format!("{}/quote", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .query(&Self::quote_query(request))
            .send()
            .await
            .map_err(|e| QuoteError::RequestFailed(e.to_string()))?;

        let quote: QuoteLeg = Self::read_json(response).await?;
        debug!(
            "Quote {} -> {}: in {} out {} slot {}",
            quote.input_mint, quote.output_mint, quote.in_amount, quote.out_amount, quote.context_slot
        );
        Ok(quote)
    }

    async fn get_swap_instructions(
        &self,
        payer: &Pubkey,
        quote: &QuoteLeg,
    ) -> Result<SwapInstructions, QuoteError> {
        let url = format!("{}/swap-instructions", self.base_url);
        let body = json!({
            "userPublicKey": payer.to_string(),
            "wrapAndUnwrapSol": false,
            "useSharedAccounts": false,
            "skipUserAccountsRpcCalls": true,
            "quoteResponse": quote,
        });

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| QuoteError::InstructionsFailed(e.to_string()))?;

        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbitrage::quote::SwapMode;

    #[test]
    fn test_quote_query_shape() {
        let request = QuoteRequest {
            input_mint: "A".to_string(),
            output_mint: "B".to_string(),
            amount: 1_000_000,
            swap_mode: SwapMode::ExactOut,
            slippage_bps: 0,
            only_direct_routes: true,
            max_accounts: None,
        };
        let query = JupiterClient::quote_query(&request);
        assert!(query.contains(&("swapMode", "ExactOut".to_string())));
        assert!(query.contains(&("onlyDirectRoutes", "true".to_string())));
        assert!(!query.iter().any(|(k, _)| *k == "maxAccounts"));

        let request = QuoteRequest {
            max_accounts: Some(28),
            ..request
        };
        let query = JupiterClient::quote_query(&request);
        assert!(query.contains(&("maxAccounts", "28".to_string())));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = JupiterClient::new("http://localhost:8080/");
        assert_eq!(client.base_url, "http://localhost:8080");
    }
}
