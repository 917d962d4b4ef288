//! Quoting and transaction-building collaborator (Jupiter swap API)

pub mod client;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::domain::arbitrage::quote::{QuoteLeg, QuoteRequest};
use crate::shared::errors::QuoteError;

pub use client::JupiterClient;

/// Quote and swap-instruction source
#[async_trait]
pub trait QuoteApiClient: Send + Sync {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteLeg, QuoteError>;

    /// Instructions executing `quote` on behalf of `payer`
    async fn get_swap_instructions(
        &self,
        payer: &Pubkey,
        quote: &QuoteLeg,
    ) -> Result<SwapInstructions, QuoteError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountPayload {
    pub pubkey: String,
    pub is_signer: bool,
    pub is_writable: bool,
}

/// Instruction as serialized by the builder: base64 data, string keys
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionPayload {
    pub program_id: String,
    pub accounts: Vec<AccountPayload>,
    pub data: String,
}

impl InstructionPayload {
    pub fn decode(&self) -> Result<Instruction, String> {
        let program_id = Pubkey::from_str(&self.program_id)
            .map_err(|e| format!("program id {}: {}", self.program_id, e))?;
        let accounts = self
            .accounts
            .iter()
            .map(|account| {
                let pubkey = Pubkey::from_str(&account.pubkey)
                    .map_err(|e| format!("account {}: {}", account.pubkey, e))?;
                Ok(if account.is_writable {
                    AccountMeta::new(pubkey, account.is_signer)
                } else {
                    AccountMeta::new_readonly(pubkey, account.is_signer)
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        let data = STANDARD
            .decode(&self.data)
            .map_err(|e| format!("instruction data: {}", e))?;
        Ok(Instruction {
            program_id,
            accounts,
            data,
        })
    }
}

/// Parts of the builder response the assembler uses
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstructions {
    #[serde(default)]
    pub setup_instructions: Vec<InstructionPayload>,
    pub swap_instruction: InstructionPayload,
    #[serde(default)]
    pub address_lookup_table_addresses: Vec<String>,
}
