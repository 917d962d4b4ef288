//! Ledger reads over the Solana JSON-RPC API

use async_trait::async_trait;
use solana_account_decoder::parse_token::UiTokenAmount;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    address_lookup_table::{state::AddressLookupTable, AddressLookupTableAccount},
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
};
use std::sync::Arc;

use crate::shared::errors::AppError;

/// A lookup table together with the slot it was read at
#[derive(Debug, Clone)]
pub struct LookupTableSnapshot {
    pub table: AddressLookupTableAccount,
    pub slot: u64,
}

/// Read-only view of ledger state
#[async_trait]
pub trait LedgerReader: Send + Sync {
    async fn fetch_lookup_table(&self, address: &Pubkey) -> Result<LookupTableSnapshot, AppError>;

    async fn latest_blockhash(&self) -> Result<Hash, AppError>;

    async fn slot(&self) -> Result<u64, AppError>;

    /// Raw token amount held by `token_account`
    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, AppError>;
}

/// Solana RPC client wrapper
pub struct SolanaLedger {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
}

impl SolanaLedger {
    pub fn new(rpc_url: String, commitment: CommitmentConfig) -> Self {
        Self {
            client: Arc::new(RpcClient::new_with_commitment(rpc_url, commitment)),
            commitment,
        }
    }

    pub fn client(&self) -> Arc<RpcClient> {
        self.client.clone()
    }
}

#[async_trait]
impl LedgerReader for SolanaLedger {
    async fn fetch_lookup_table(&self, address: &Pubkey) -> Result<LookupTableSnapshot, AppError> {
        let response = self
            .client
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get lookup table {}: {}", address, e)))?;

        let account = response
            .value
            .ok_or_else(|| AppError::BlockchainError(format!("Lookup table {} not found", address)))?;

        let table = decode_lookup_table(address, &account.data)?;
        Ok(LookupTableSnapshot {
            table,
            slot: response.context.slot,
        })
    }

    async fn latest_blockhash(&self) -> Result<Hash, AppError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get latest blockhash: {}", e)))
    }

    async fn slot(&self) -> Result<u64, AppError> {
        self.client
            .get_slot_with_commitment(self.commitment)
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get slot: {}", e)))
    }

    async fn token_balance(&self, token_account: &Pubkey) -> Result<u64, AppError> {
        let amount = self
            .client
            .get_token_account_balance_with_commitment(token_account, self.commitment)
            .await
            .map_err(|e| AppError::BlockchainError(format!("Failed to get token balance: {}", e)))?
            .value;
        raw_amount(&amount)
    }
}

pub fn decode_lookup_table(address: &Pubkey, data: &[u8]) -> Result<AddressLookupTableAccount, AppError> {
    let table = AddressLookupTable::deserialize(data)
        .map_err(|e| AppError::BlockchainError(format!("Invalid lookup table {}: {}", address, e)))?;
    Ok(AddressLookupTableAccount {
        key: *address,
        addresses: table.addresses.to_vec(),
    })
}

fn raw_amount(amount: &UiTokenAmount) -> Result<u64, AppError> {
    amount
        .amount
        .parse::<u64>()
        .map_err(|e| AppError::BlockchainError(format!("Invalid token amount '{}': {}", amount.amount, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_amount_uses_integer_field() {
        let amount = UiTokenAmount {
            ui_amount: Some(1.5),
            decimals: 9,
            amount: "1500000000".to_string(),
            ui_amount_string: "1.5".to_string(),
        };
        assert_eq!(raw_amount(&amount).unwrap(), 1_500_000_000);

        let bad = UiTokenAmount {
            amount: "n/a".to_string(),
            ..amount
        };
        assert!(raw_amount(&bad).is_err());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let address = Pubkey::new_unique();
        assert!(decode_lookup_table(&address, &[1, 2, 3]).is_err());
    }
}
