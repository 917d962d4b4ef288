//! Direct submission to RPC nodes

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::transaction::VersionedTransaction;

use crate::shared::errors::DeliveryError;

#[async_trait]
pub trait TransactionSender: Send + Sync {
    fn endpoint(&self) -> &str;

    /// Submit one transaction, returning its signature
    async fn send(&self, transaction: &VersionedTransaction) -> Result<String, DeliveryError>;
}

/// Raw submission without preflight; retries are driven by the caller
pub struct RpcNodeSender {
    endpoint: String,
    client: RpcClient,
}

impl RpcNodeSender {
    pub fn new(endpoint: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: RpcClient::new_with_commitment(endpoint.clone(), commitment),
            endpoint,
        }
    }

    fn send_config() -> RpcSendTransactionConfig {
        RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(0),
            ..RpcSendTransactionConfig::default()
        }
    }
}

#[async_trait]
impl TransactionSender for RpcNodeSender {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, transaction: &VersionedTransaction) -> Result<String, DeliveryError> {
        self.client
            .send_transaction_with_config(transaction, Self::send_config())
            .await
            .map(|signature| signature.to_string())
            .map_err(|e| DeliveryError::Rpc {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            })
    }
}
