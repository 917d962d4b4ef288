//! In-process fakes for the collaborator traits

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use parking_lot::Mutex;
use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::VersionedTransaction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Barrier;

use crate::domain::arbitrage::quote::{QuoteLeg, QuoteRequest, SwapMode};
use crate::infrastructure::blockchain::ledger::{LedgerReader, LookupTableSnapshot};
use crate::infrastructure::blockchain::priority_fee::PriorityFeeOracle;
use crate::infrastructure::broadcast::{BundleRelay, TransactionSender};
use crate::infrastructure::jupiter::{InstructionPayload, QuoteApiClient, SwapInstructions};
use crate::infrastructure::log_sink::LogSink;
use crate::infrastructure::subscription::SubscriptionRegistry;
use crate::shared::errors::{AppError, DeliveryError, QuoteError, SinkError};
use crate::shared::types::{PriorityFeeLevels, SendRecord, SubscriptionRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryCall {
    WatchSignature(String),
    WatchAccount(String),
    UnwatchAccount(String),
}

#[derive(Default)]
pub struct FakeRegistry {
    calls: Mutex<Vec<RegistryCall>>,
    next_id: AtomicU64,
}

impl FakeRegistry {
    pub fn calls(&self) -> Vec<RegistryCall> {
        self.calls.lock().clone()
    }

    pub fn watched_signatures(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RegistryCall::WatchSignature(s) => Some(s),
                _ => None,
            })
            .collect()
    }
}

impl SubscriptionRegistry for FakeRegistry {
    fn watch_signature(&self, signature: &str) -> u64 {
        self.calls.lock().push(RegistryCall::WatchSignature(signature.to_string()));
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn watch_account(&self, address: &str) -> u64 {
        self.calls.lock().push(RegistryCall::WatchAccount(address.to_string()));
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn unwatch_account(&self, address: &str) {
        self.calls.lock().push(RegistryCall::UnwatchAccount(address.to_string()));
    }
}

#[derive(Default)]
pub struct FakeLedger {
    tables: Mutex<HashMap<Pubkey, LookupTableSnapshot>>,
    table_fetches: AtomicUsize,
    blockhash: Mutex<Option<Hash>>,
    slot: AtomicU64,
    balance: AtomicU64,
    /// Every table fetch waits here when set
    table_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl FakeLedger {
    pub fn set_table_barrier(&self, barrier: Arc<Barrier>) {
        *self.table_barrier.lock() = Some(barrier);
    }

    pub fn put_table(&self, snapshot: LookupTableSnapshot) {
        self.tables.lock().insert(snapshot.table.key, snapshot);
    }

    pub fn remove_table(&self, address: &Pubkey) {
        self.tables.lock().remove(address);
    }

    pub fn table_fetches(&self) -> usize {
        self.table_fetches.load(Ordering::SeqCst)
    }

    pub fn set_blockhash(&self, hash: Hash) {
        *self.blockhash.lock() = Some(hash);
    }

    pub fn set_slot(&self, slot: u64) {
        self.slot.store(slot, Ordering::SeqCst);
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.store(balance, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerReader for FakeLedger {
    async fn fetch_lookup_table(&self, address: &Pubkey) -> Result<LookupTableSnapshot, AppError> {
        self.table_fetches.fetch_add(1, Ordering::SeqCst);
        let barrier = self.table_barrier.lock().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
        self.tables
            .lock()
            .get(address)
            .cloned()
            .ok_or_else(|| AppError::BlockchainError(format!("Lookup table {} not found", address)))
    }

    async fn latest_blockhash(&self) -> Result<Hash, AppError> {
        (*self.blockhash.lock()).ok_or_else(|| AppError::BlockchainError("no blockhash".to_string()))
    }

    async fn slot(&self) -> Result<u64, AppError> {
        Ok(self.slot.load(Ordering::SeqCst))
    }

    async fn token_balance(&self, _token_account: &Pubkey) -> Result<u64, AppError> {
        Ok(self.balance.load(Ordering::SeqCst))
    }
}

/// Builder response with `setup_count` setup instructions and a swap
pub fn swap_instructions(setup_count: usize, tables: Vec<Pubkey>) -> SwapInstructions {
    let program = Pubkey::new_unique().to_string();
    let payload = |tag: u8| InstructionPayload {
        program_id: program.clone(),
        accounts: vec![],
        data: STANDARD.encode([tag]),
    };
    SwapInstructions {
        setup_instructions: (0..setup_count).map(|i| payload(i as u8)).collect(),
        swap_instruction: payload(0xff),
        address_lookup_table_addresses: tables.iter().map(|t| t.to_string()).collect(),
    }
}

pub struct FakeQuoteApi {
    quotes: Mutex<HashMap<SwapMode, Result<QuoteLeg, QuoteError>>>,
    swap: Mutex<Result<SwapInstructions, QuoteError>>,
    last_swap_quote: Mutex<Option<QuoteLeg>>,
    quote_calls: AtomicUsize,
    swap_calls: AtomicUsize,
    /// Runs inside every quote call, before the response is returned
    on_quote: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl Default for FakeQuoteApi {
    fn default() -> Self {
        Self {
            quotes: Mutex::new(HashMap::new()),
            swap: Mutex::new(Ok(swap_instructions(1, vec![]))),
            last_swap_quote: Mutex::new(None),
            quote_calls: AtomicUsize::new(0),
            swap_calls: AtomicUsize::new(0),
            on_quote: Mutex::new(None),
        }
    }
}

impl FakeQuoteApi {
    /// Answer requests of `mode` with `response`
    pub fn set_quote(&self, mode: SwapMode, response: Result<QuoteLeg, QuoteError>) {
        self.quotes.lock().insert(mode, response);
    }

    pub fn on_quote(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_quote.lock() = Some(Box::new(hook));
    }

    pub fn set_swap_instructions(&self, response: Result<SwapInstructions, QuoteError>) {
        *self.swap.lock() = response;
    }

    pub fn last_swap_quote(&self) -> Option<QuoteLeg> {
        self.last_swap_quote.lock().clone()
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn swap_calls(&self) -> usize {
        self.swap_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteApiClient for FakeQuoteApi {
    async fn get_quote(&self, request: &QuoteRequest) -> Result<QuoteLeg, QuoteError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.on_quote.lock().as_ref() {
            hook();
        }
        self.quotes
            .lock()
            .get(&request.swap_mode)
            .cloned()
            .unwrap_or_else(|| Err(QuoteError::RequestFailed("no quote configured".to_string())))
    }

    async fn get_swap_instructions(
        &self,
        _payer: &Pubkey,
        quote: &QuoteLeg,
    ) -> Result<SwapInstructions, QuoteError> {
        self.swap_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_swap_quote.lock() = Some(quote.clone());
        self.swap.lock().clone()
    }
}

pub struct FakeSender {
    endpoint: String,
    /// Attempts that fail before the first success; u32::MAX never succeeds
    failures: u32,
    attempts: AtomicU32,
    /// Every attempt waits here when set
    barrier: Option<Arc<Barrier>>,
}

impl FakeSender {
    pub fn new(endpoint: &str, failures: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            failures,
            attempts: AtomicU32::new(0),
            barrier: None,
        }
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSender for FakeSender {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(&self, transaction: &VersionedTransaction) -> Result<String, DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if attempt < self.failures {
            return Err(DeliveryError::Rpc {
                endpoint: self.endpoint.clone(),
                reason: "node unavailable".to_string(),
            });
        }
        Ok(transaction.signatures[0].to_string())
    }
}

pub struct FakeRelay {
    endpoint: String,
    failures: u32,
    attempts: AtomicU32,
    barrier: Option<Arc<Barrier>>,
}

impl FakeRelay {
    pub fn new(endpoint: &str, failures: u32) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            failures,
            attempts: AtomicU32::new(0),
            barrier: None,
        }
    }

    pub fn with_barrier(mut self, barrier: Arc<Barrier>) -> Self {
        self.barrier = Some(barrier);
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BundleRelay for FakeRelay {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_bundle(&self, transactions: &[VersionedTransaction]) -> Result<String, DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }
        if attempt < self.failures {
            return Err(DeliveryError::Relay {
                endpoint: self.endpoint.clone(),
                reason: "bundle rejected".to_string(),
            });
        }
        Ok(format!("bundle-{}-{}", self.endpoint, transactions.len()))
    }
}

pub struct FakeFeeOracle(pub PriorityFeeLevels);

#[async_trait]
impl PriorityFeeOracle for FakeFeeOracle {
    async fn estimate(&self) -> Result<PriorityFeeLevels, AppError> {
        Ok(self.0)
    }
}

/// Sink that keeps every record in memory
#[derive(Default)]
pub struct MemoryLogSink {
    sends: Mutex<Vec<SendRecord>>,
    subscriptions: Mutex<Vec<SubscriptionRecord>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sends(&self) -> Vec<SendRecord> {
        self.sends.lock().clone()
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.subscriptions.lock().clone()
    }
}

#[async_trait]
impl LogSink for MemoryLogSink {
    async fn record_send(&self, record: &SendRecord) -> Result<(), SinkError> {
        self.sends.lock().push(record.clone());
        Ok(())
    }

    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<(), SinkError> {
        self.subscriptions.lock().push(record.clone());
        Ok(())
    }

    async fn update_subscription(
        &self,
        signature: &str,
        land_slot: Option<u64>,
        status: &str,
    ) -> Result<(), SinkError> {
        for record in self.subscriptions.lock().iter_mut().filter(|r| r.signature == signature) {
            if land_slot.is_some() {
                record.land_slot = land_slot;
            }
            record.status = status.to_string();
        }
        Ok(())
    }

    async fn last_subscription_id(&self) -> Result<u64, SinkError> {
        Ok(self.subscriptions.lock().len() as u64)
    }
}
