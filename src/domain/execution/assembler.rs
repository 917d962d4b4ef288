//! Turns an accepted candidate into signed, redundant transaction copies

use rand::seq::SliceRandom;
use solana_sdk::{
    address_lookup_table::AddressLookupTableAccount,
    compute_budget::ComputeBudgetInstruction,
    hash::Hash,
    instruction::Instruction,
    message::{v0, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::VersionedTransaction,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

use super::lookup_cache::LookupTableCache;
use crate::domain::arbitrage::decision::ArbitrageCandidate;
use crate::domain::arbitrage::quote::{merge_legs, QuoteLeg};
use crate::infrastructure::blockchain::ledger::LedgerReader;
use crate::infrastructure::jupiter::{InstructionPayload, QuoteApiClient};
use crate::shared::errors::AssemblyError;
use crate::shared::types::DeliveryMode;

/// Signed copies of one candidate, one per blockhash per variant
#[derive(Debug, Clone, Default)]
pub struct AssembledBatch {
    /// For direct nodes, without the tip transfer
    pub plain: Vec<VersionedTransaction>,
    /// For relays, with the tip transfer appended
    pub incentive: Vec<VersionedTransaction>,
}

impl AssembledBatch {
    pub fn len(&self) -> usize {
        self.plain.len() + self.incentive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Tip transfer appended to the incentive variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub from: Pubkey,
    pub to: Pubkey,
    pub lamports: u64,
}

/// Instruction lists for both variants. Order is fixed:
/// compute-unit limit, compute-unit price, setup, swap, then the tip
/// (incentive variant only).
pub fn build_instruction_sets(
    setup: Vec<Instruction>,
    swap: Instruction,
    compute_unit_limit: u32,
    compute_unit_price: u64,
    tip: Option<Tip>,
) -> (Vec<Instruction>, Option<Vec<Instruction>>) {
    let mut plain = Vec::with_capacity(setup.len() + 4);
    plain.push(ComputeBudgetInstruction::set_compute_unit_limit(compute_unit_limit));
    plain.push(ComputeBudgetInstruction::set_compute_unit_price(compute_unit_price));
    plain.extend(setup);
    plain.push(swap);

    let incentive = tip.map(|tip| {
        let mut ixs = plain.clone();
        ixs.push(system_instruction::transfer(&tip.from, &tip.to, tip.lamports));
        ixs
    });
    (plain, incentive)
}

/// Minimum round-trip output: principal, plus the tip when relays are paid
pub fn minimum_out(leg0: &QuoteLeg, incentive: u64, mode: DeliveryMode) -> u64 {
    if mode.uses_relays() {
        leg0.in_amount.saturating_add(incentive)
    } else {
        leg0.in_amount
    }
}

pub struct TransactionAssembler {
    payer: Arc<Keypair>,
    quote_api: Arc<dyn QuoteApiClient>,
    cache: Arc<LookupTableCache>,
    reader: Arc<dyn LedgerReader>,
    compute_unit_limit: u32,
    tip_accounts: Vec<Pubkey>,
    mode: DeliveryMode,
}

impl TransactionAssembler {
    pub fn new(
        payer: Arc<Keypair>,
        quote_api: Arc<dyn QuoteApiClient>,
        cache: Arc<LookupTableCache>,
        reader: Arc<dyn LedgerReader>,
        compute_unit_limit: u32,
        tip_accounts: Vec<Pubkey>,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            payer,
            quote_api,
            cache,
            reader,
            compute_unit_limit,
            tip_accounts,
            mode,
        }
    }

    pub fn payer(&self) -> Pubkey {
        self.payer.pubkey()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Build every signed copy for `candidate`. Any failure aborts the
    /// whole candidate.
    pub async fn assemble(
        &self,
        leg0: &QuoteLeg,
        leg1: &QuoteLeg,
        candidate: &ArbitrageCandidate,
        blockhashes: &[Hash],
    ) -> Result<AssembledBatch, AssemblyError> {
        if blockhashes.is_empty() {
            return Err(AssemblyError::NoBlockhash);
        }

        let payer = self.payer.pubkey();
        let min_out = minimum_out(leg0, candidate.incentive_amount, self.mode);
        let merged = merge_legs(leg0, leg1, min_out);

        let response = self.quote_api.get_swap_instructions(&payer, &merged).await?;

        let setup = response
            .setup_instructions
            .iter()
            .map(decode)
            .collect::<Result<Vec<_>, _>>()?;
        let swap = decode(&response.swap_instruction)?;

        let table_addresses = response
            .address_lookup_table_addresses
            .iter()
            .map(|a| {
                Pubkey::from_str(a).map_err(|e| AssemblyError::LookupTable {
                    address: a.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tables = self.cache.resolve(&table_addresses, self.reader.as_ref()).await?;

        let tip = if self.mode.uses_relays() {
            let to = self
                .tip_accounts
                .choose(&mut rand::thread_rng())
                .copied()
                .ok_or_else(|| AssemblyError::InvalidInstruction("no tip accounts configured".to_string()))?;
            Some(Tip {
                from: payer,
                to,
                lamports: candidate.incentive_amount,
            })
        } else {
            None
        };

        let (plain_ixs, incentive_ixs) = build_instruction_sets(
            setup,
            swap,
            self.compute_unit_limit,
            candidate.priority_fee,
            tip,
        );

        let mut batch = AssembledBatch::default();
        for hash in blockhashes {
            if self.mode.uses_rpc() {
                batch.plain.push(self.sign(&plain_ixs, &tables, *hash)?);
            }
            if let Some(ixs) = &incentive_ixs {
                batch.incentive.push(self.sign(ixs, &tables, *hash)?);
            }
        }

        debug!(
            "Assembled {} plain + {} incentive transactions over {} blockhashes",
            batch.plain.len(),
            batch.incentive.len(),
            blockhashes.len()
        );
        Ok(batch)
    }

    fn sign(
        &self,
        instructions: &[Instruction],
        tables: &[AddressLookupTableAccount],
        blockhash: Hash,
    ) -> Result<VersionedTransaction, AssemblyError> {
        let message = v0::Message::try_compile(&self.payer.pubkey(), instructions, tables, blockhash)
            .map_err(|e| AssemblyError::Compile(e.to_string()))?;
        VersionedTransaction::try_new(VersionedMessage::V0(message), &[self.payer.as_ref()])
            .map_err(|e| AssemblyError::Signing(e.to_string()))
    }
}

fn decode(payload: &InstructionPayload) -> Result<Instruction, AssemblyError> {
    payload.decode().map_err(AssemblyError::InvalidInstruction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbitrage::fee_tier::PriorityTier;
    use crate::domain::arbitrage::quote::tests::leg;
    use crate::infrastructure::blockchain::ledger::LookupTableSnapshot;
    use crate::testing::{swap_instructions, FakeLedger, FakeQuoteApi, FakeRegistry};
    use solana_sdk::compute_budget;

    fn candidate(incentive: u64) -> ArbitrageCandidate {
        ArbitrageCandidate {
            buy_price: 0.99,
            sell_price: 1.0,
            profit_ratio: 0.01,
            incentive_amount: incentive,
            trade_size: 1_000,
            tier: PriorityTier::Medium,
            priority_fee: 7_000,
        }
    }

    struct Fixture {
        assembler: TransactionAssembler,
        quote_api: Arc<FakeQuoteApi>,
        registry: Arc<FakeRegistry>,
        table: Pubkey,
        tip_account: Pubkey,
    }

    fn fixture(mode: DeliveryMode) -> Fixture {
        let payer = Arc::new(Keypair::new());
        let table = Pubkey::new_unique();
        let tip_account = Pubkey::new_unique();

        let ledger = Arc::new(FakeLedger::default());
        ledger.put_table(LookupTableSnapshot {
            table: AddressLookupTableAccount {
                key: table,
                addresses: vec![Pubkey::new_unique(), Pubkey::new_unique()],
            },
            slot: 5,
        });

        let quote_api = Arc::new(FakeQuoteApi::default());
        quote_api.set_swap_instructions(Ok(swap_instructions(2, vec![table])));

        let registry = Arc::new(FakeRegistry::default());
        let cache = Arc::new(LookupTableCache::new(8, registry.clone()));

        let assembler = TransactionAssembler::new(
            payer,
            quote_api.clone(),
            cache,
            ledger,
            199_999,
            vec![tip_account],
            mode,
        );
        Fixture {
            assembler,
            quote_api,
            registry,
            table,
            tip_account,
        }
    }

    #[test]
    fn test_instruction_order_and_tip_only_on_incentive_variant() {
        let program = Pubkey::new_unique();
        let setup = vec![
            Instruction::new_with_bytes(program, &[1], vec![]),
            Instruction::new_with_bytes(program, &[2], vec![]),
        ];
        let swap = Instruction::new_with_bytes(program, &[9], vec![]);
        let tip = Tip {
            from: Pubkey::new_unique(),
            to: Pubkey::new_unique(),
            lamports: 100_000,
        };

        let (plain, incentive) = build_instruction_sets(setup.clone(), swap.clone(), 199_999, 7_000, Some(tip));
        let incentive = incentive.unwrap();

        assert_eq!(plain.len(), 5);
        assert_eq!(incentive.len(), plain.len() + 1);
        assert_eq!(plain[0], ComputeBudgetInstruction::set_compute_unit_limit(199_999));
        assert_eq!(plain[1], ComputeBudgetInstruction::set_compute_unit_price(7_000));
        assert_eq!(&plain[2..4], setup.as_slice());
        assert_eq!(plain[4], swap);
        assert_eq!(&incentive[..5], plain.as_slice());
        assert_eq!(incentive[5], system_instruction::transfer(&tip.from, &tip.to, 100_000));

        let (_, none) = build_instruction_sets(setup, swap, 1, 1, None);
        assert!(none.is_none());
    }

    #[test]
    fn test_minimum_out_includes_tip_only_with_relays() {
        let leg0 = leg("SOL", "BONK", 1_000, 1_010, 1, "a");
        assert_eq!(minimum_out(&leg0, 50, DeliveryMode::Both), 1_050);
        assert_eq!(minimum_out(&leg0, 50, DeliveryMode::RelayOnly), 1_050);
        assert_eq!(minimum_out(&leg0, 50, DeliveryMode::RpcOnly), 1_000);
    }

    #[tokio::test]
    async fn test_assemble_one_copy_per_blockhash_per_variant() {
        let fx = fixture(DeliveryMode::Both);
        let leg0 = leg("SOL", "BONK", 1_000, 1_010, 1, "pool-a");
        let leg1 = leg("BONK", "SOL", 1_005, 1_000, 1, "pool-b");
        let hashes = [Hash::new_unique(), Hash::new_unique(), Hash::new_unique()];

        let batch = fx.assembler.assemble(&leg0, &leg1, &candidate(100_000), &hashes).await.unwrap();

        assert_eq!(batch.plain.len(), 3);
        assert_eq!(batch.incentive.len(), 3);
        for (i, hash) in hashes.iter().enumerate() {
            assert_eq!(batch.plain[i].message.recent_blockhash(), hash);
            assert_eq!(batch.incentive[i].message.recent_blockhash(), hash);
            assert_eq!(
                batch.incentive[i].message.instructions().len(),
                batch.plain[i].message.instructions().len() + 1
            );
            assert!(batch.plain[i].verify_with_results().iter().all(|ok| *ok));
        }

        // The tip account appears only in the incentive variant.
        let keys = batch.incentive[0].message.static_account_keys();
        assert!(keys.contains(&fx.tip_account));
        assert!(!batch.plain[0].message.static_account_keys().contains(&fx.tip_account));

        // The builder saw the merged route with the tip-inclusive floor.
        let merged = fx.quote_api.last_swap_quote().unwrap();
        assert_eq!(merged.out_amount, 101_000);
        assert_eq!(merged.route_plan.len(), 2);

        // The table was fetched and registered for change notifications.
        assert_eq!(fx.registry.calls().len(), 1);
        assert!(batch.plain[0]
            .message
            .address_table_lookups()
            .map(|lookups| lookups.iter().all(|l| l.account_key == fx.table))
            .unwrap_or(true));
    }

    #[tokio::test]
    async fn test_rpc_only_builds_plain_variant_only() {
        let fx = fixture(DeliveryMode::RpcOnly);
        let leg0 = leg("SOL", "BONK", 1_000, 1_010, 1, "pool-a");
        let leg1 = leg("BONK", "SOL", 1_005, 1_000, 1, "pool-b");

        let batch = fx
            .assembler
            .assemble(&leg0, &leg1, &candidate(100_000), &[Hash::new_unique()])
            .await
            .unwrap();
        assert_eq!(batch.plain.len(), 1);
        assert!(batch.incentive.is_empty());
        assert_eq!(fx.quote_api.last_swap_quote().unwrap().out_amount, 1_000);

        let ixs = batch.plain[0].message.instructions();
        let keys = batch.plain[0].message.static_account_keys();
        assert_eq!(keys[ixs[0].program_id_index as usize], compute_budget::id());
    }

    #[tokio::test]
    async fn test_builder_failure_aborts_candidate() {
        let fx = fixture(DeliveryMode::Both);
        fx.quote_api.set_swap_instructions(Err(crate::shared::errors::QuoteError::InstructionsFailed(
            "503".to_string(),
        )));
        let leg0 = leg("SOL", "BONK", 1_000, 1_010, 1, "pool-a");
        let leg1 = leg("BONK", "SOL", 1_005, 1_000, 1, "pool-b");

        let result = fx
            .assembler
            .assemble(&leg0, &leg1, &candidate(1), &[Hash::new_unique()])
            .await;
        assert!(matches!(result, Err(AssemblyError::SwapInstructions(_))));
    }

    #[tokio::test]
    async fn test_empty_window_rejected() {
        let fx = fixture(DeliveryMode::Both);
        let leg0 = leg("SOL", "BONK", 1_000, 1_010, 1, "pool-a");
        let leg1 = leg("BONK", "SOL", 1_005, 1_000, 1, "pool-b");
        let result = fx.assembler.assemble(&leg0, &leg1, &candidate(1), &[]).await;
        assert!(matches!(result, Err(AssemblyError::NoBlockhash)));
    }
}
