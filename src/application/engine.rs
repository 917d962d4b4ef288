//! Decision engine polling loop
//!
//! Cycles over the configured quote assets with a cursor. Each cycle asks
//! for the two opposite-direction quotes, evaluates them, and hands an
//! accepted candidate to a detached assemble-and-broadcast task so the next
//! cycle never waits on delivery.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::domain::arbitrage::decision::{evaluate, ArbitrageCandidate, DecisionConfig, EvaluationContext, RejectReason};
use crate::domain::arbitrage::quote::{QuoteLeg, QuoteRequest, SwapMode};
use crate::domain::execution::assembler::TransactionAssembler;
use crate::infrastructure::broadcast::{Broadcaster, SendContext, SendOutcome};
use crate::infrastructure::jupiter::QuoteApiClient;
use crate::shared::state::MarketView;
use crate::shared::types::TradePair;
use crate::shared::utils::generate_id;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub base: TradePair,
    pub quotes: Vec<TradePair>,
    /// Share of the base balance traded per cycle
    pub trade_fraction: f64,
    pub direct_route: bool,
    pub max_accounts: Option<u8>,
    pub round_interval: Duration,
    pub decision: DecisionConfig,
}

/// What one evaluation cycle did
#[derive(Debug)]
pub enum CycleOutcome {
    /// Balance too small to size a trade
    NoTradeSize,
    QuoteFailed(String),
    Rejected(RejectReason),
    /// Assembly and delivery continue on `task`
    Dispatched {
        candidate: ArbitrageCandidate,
        task: JoinHandle<Vec<SendOutcome>>,
    },
}

pub struct DecisionEngine {
    quote_api: Arc<dyn QuoteApiClient>,
    market: MarketView,
    assembler: Arc<TransactionAssembler>,
    broadcaster: Arc<Broadcaster>,
    settings: EngineSettings,
    cursor: usize,
}

impl DecisionEngine {
    pub fn new(
        quote_api: Arc<dyn QuoteApiClient>,
        market: MarketView,
        assembler: Arc<TransactionAssembler>,
        broadcaster: Arc<Broadcaster>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            quote_api,
            market,
            assembler,
            broadcaster,
            settings,
            cursor: 0,
        }
    }

    /// Run cycles forever. Only an empty pair list stops the loop.
    pub async fn run(mut self) -> Result<()> {
        if self.settings.quotes.is_empty() {
            bail!("no quote assets configured");
        }
        info!(
            "🚀 Decision engine started: {} pairs against {}, every {:?}",
            self.settings.quotes.len(),
            self.settings.base,
            self.settings.round_interval
        );

        loop {
            let pair = self.next_pair().clone();
            match self.run_cycle(&pair).await {
                CycleOutcome::QuoteFailed(e) => warn!("⚠️ [{}] quote failed: {}", pair, e),
                CycleOutcome::NoTradeSize => debug!("[{}] balance too small to trade", pair),
                CycleOutcome::Rejected(_) | CycleOutcome::Dispatched { .. } => {}
            }
            tokio::time::sleep(self.settings.round_interval).await;
        }
    }

    /// Pair for the next cycle; advances the cursor
    pub fn next_pair(&mut self) -> &TradePair {
        let index = self.cursor % self.settings.quotes.len();
        self.cursor = (index + 1) % self.settings.quotes.len();
        &self.settings.quotes[index]
    }

    pub fn trade_size(&self) -> u64 {
        (self.market.balance() as f64 * self.settings.trade_fraction).floor() as u64
    }

    /// Leg0 buys the quote asset with an exact base amount; leg1 buys back
    /// exactly that base amount.
    pub fn quote_requests(&self, pair: &TradePair, trade_size: u64) -> (QuoteRequest, QuoteRequest) {
        let leg0 = QuoteRequest {
            input_mint: self.settings.base.mint.clone(),
            output_mint: pair.mint.clone(),
            amount: trade_size,
            swap_mode: SwapMode::ExactIn,
            slippage_bps: 0,
            only_direct_routes: self.settings.direct_route,
            max_accounts: self.settings.max_accounts,
        };
        let leg1 = QuoteRequest {
            input_mint: pair.mint.clone(),
            output_mint: self.settings.base.mint.clone(),
            amount: trade_size,
            swap_mode: SwapMode::ExactOut,
            slippage_bps: 0,
            only_direct_routes: self.settings.direct_route,
            max_accounts: None,
        };
        (leg0, leg1)
    }

    pub async fn run_cycle(&self, pair: &TradePair) -> CycleOutcome {
        let trade_size = self.trade_size();
        if trade_size == 0 {
            return CycleOutcome::NoTradeSize;
        }

        let start_slot = self.market.latest_slot();
        let (request0, request1) = self.quote_requests(pair, trade_size);
        let (leg0, leg1) = match tokio::try_join!(
            self.quote_api.get_quote(&request0),
            self.quote_api.get_quote(&request1)
        ) {
            Ok(legs) => legs,
            Err(e) => return CycleOutcome::QuoteFailed(e.to_string()),
        };

        // The quotes are judged against the slot at their arrival.
        let ctx = EvaluationContext {
            latest_slot: self.market.latest_slot(),
            trade_size,
            fee_levels: self.market.priority_fees(),
        };
        let candidate = match evaluate(&leg0, &leg1, &ctx, &self.settings.decision) {
            Ok(candidate) => candidate,
            Err(reason) => {
                debug!("[{}-{}] rejected: {}", self.settings.base, pair, reason);
                return CycleOutcome::Rejected(reason);
            }
        };

        // Correlates the detached delivery logs with this cycle.
        let label = format!("{}-{}#{}", self.settings.base, pair, &generate_id()[..8]);
        info!(
            "💰 [{}] buy {:.9} sell {:.9} profit {:.4}% tip {} fee {} ({})",
            label,
            candidate.buy_price,
            candidate.sell_price,
            candidate.profit_ratio * 100.0,
            candidate.incentive_amount,
            candidate.priority_fee,
            candidate.tier.as_str()
        );

        let send_ctx = SendContext {
            label,
            start_slot,
            quote0_slot: Some(leg0.context_slot),
            quote1_slot: Some(leg1.context_slot),
        };
        let task = tokio::spawn(execute_candidate(
            self.assembler.clone(),
            self.broadcaster.clone(),
            self.market.clone(),
            leg0,
            leg1,
            candidate.clone(),
            send_ctx,
        ));
        CycleOutcome::Dispatched { candidate, task }
    }
}

/// Assemble against the current blockhash window and broadcast. Assembly
/// failures drop the candidate.
async fn execute_candidate(
    assembler: Arc<TransactionAssembler>,
    broadcaster: Arc<Broadcaster>,
    market: MarketView,
    leg0: QuoteLeg,
    leg1: QuoteLeg,
    candidate: ArbitrageCandidate,
    ctx: SendContext,
) -> Vec<SendOutcome> {
    let blockhashes = market.blockhashes();
    let batch = match assembler.assemble(&leg0, &leg1, &candidate, &blockhashes).await {
        Ok(batch) => batch,
        Err(e) => {
            error!("❌ [{}] assembly failed: {}", ctx.label, e);
            return Vec::new();
        }
    };
    broadcaster.broadcast(&batch, &ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbitrage::quote::tests::leg;
    use crate::domain::execution::lookup_cache::LookupTableCache;
    use crate::infrastructure::broadcast::{BundleRelay, TransactionSender};
    use crate::shared::errors::QuoteError;
    use crate::shared::state::{market_state, MarketWriters};
    use crate::shared::types::{DeliveryMode, WSOL_MINT};
    use crate::shared::utils::RetryPolicy;
    use crate::testing::{
        FakeLedger, FakeQuoteApi, FakeRegistry, FakeRelay, FakeSender, MemoryLogSink,
    };
    use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair};

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    struct Harness {
        engine: DecisionEngine,
        writers: Arc<MarketWriters>,
        quote_api: Arc<FakeQuoteApi>,
        sink: Arc<MemoryLogSink>,
        registry: Arc<FakeRegistry>,
    }

    fn harness(quotes: Vec<TradePair>) -> Harness {
        harness_with(quotes, DecisionConfig::default())
    }

    fn harness_with(quotes: Vec<TradePair>, decision: DecisionConfig) -> Harness {
        let (writers, market) = market_state(1);
        let writers = Arc::new(writers);
        let quote_api = Arc::new(FakeQuoteApi::default());
        let registry = Arc::new(FakeRegistry::default());
        let sink = Arc::new(MemoryLogSink::new());

        let assembler = Arc::new(TransactionAssembler::new(
            Arc::new(Keypair::new()),
            quote_api.clone(),
            Arc::new(LookupTableCache::new(8, registry.clone())),
            Arc::new(FakeLedger::default()),
            199_999,
            vec![Pubkey::new_unique()],
            DeliveryMode::Both,
        ));
        let broadcaster = Arc::new(Broadcaster::new(
            vec![Arc::new(FakeSender::new("node-a", 0)) as Arc<dyn TransactionSender>],
            vec![Arc::new(FakeRelay::new("relay-a", 0)) as Arc<dyn BundleRelay>],
            DeliveryMode::Both,
            RetryPolicy::new(2, Duration::from_millis(1)),
            sink.clone(),
            registry.clone(),
        ));

        let settings = EngineSettings {
            base: TradePair::new("wsol", WSOL_MINT),
            quotes,
            trade_fraction: 0.1,
            direct_route: true,
            max_accounts: Some(28),
            round_interval: Duration::from_millis(350),
            decision,
        };

        Harness {
            engine: DecisionEngine::new(quote_api.clone(), market, assembler, broadcaster, settings),
            writers,
            quote_api,
            sink,
            registry,
        }
    }

    fn bonk() -> TradePair {
        TradePair::new("bonk", BONK)
    }

    fn exact_out(mut quote: QuoteLeg) -> QuoteLeg {
        quote.swap_mode = SwapMode::ExactOut;
        quote
    }

    #[test]
    fn test_cursor_wraps_over_pairs() {
        let mut h = harness(vec![bonk(), TradePair::new("usdc", "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")]);
        assert_eq!(h.engine.next_pair().symbol, "bonk");
        assert_eq!(h.engine.next_pair().symbol, "usdc");
        assert_eq!(h.engine.next_pair().symbol, "bonk");
    }

    #[test]
    fn test_quote_request_shape() {
        let h = harness(vec![bonk()]);
        let (r0, r1) = h.engine.quote_requests(&bonk(), 1_000);

        assert_eq!(r0.input_mint, WSOL_MINT);
        assert_eq!(r0.output_mint, BONK);
        assert_eq!(r0.swap_mode, SwapMode::ExactIn);
        assert_eq!(r0.max_accounts, Some(28));
        assert_eq!(r1.input_mint, BONK);
        assert_eq!(r1.output_mint, WSOL_MINT);
        assert_eq!(r1.swap_mode, SwapMode::ExactOut);
        assert_eq!(r1.amount, 1_000);
        assert_eq!(r1.slippage_bps, 0);
        assert!(r0.only_direct_routes && r1.only_direct_routes);
    }

    #[tokio::test]
    async fn test_zero_balance_skips_quoting() {
        let h = harness(vec![bonk()]);
        let outcome = h.engine.run_cycle(&bonk()).await;
        assert!(matches!(outcome, CycleOutcome::NoTradeSize));
        assert_eq!(h.quote_api.quote_calls(), 0);
    }

    #[tokio::test]
    async fn test_quote_failure_aborts_cycle_only() {
        let h = harness(vec![bonk()]);
        h.writers.set_balance(10_000);
        h.quote_api.set_quote(SwapMode::ExactIn, Ok(leg(WSOL_MINT, BONK, 1_000, 2_000, 5, "pool-a")));
        h.quote_api
            .set_quote(SwapMode::ExactOut, Err(QuoteError::RequestFailed("timeout".to_string())));

        let outcome = h.engine.run_cycle(&bonk()).await;
        assert!(matches!(outcome, CycleOutcome::QuoteFailed(_)));
        assert_eq!(h.quote_api.swap_calls(), 0);
    }

    #[tokio::test]
    async fn test_unprofitable_never_builds() {
        let h = harness(vec![bonk()]);
        h.writers.set_balance(10_000);
        h.quote_api.set_quote(SwapMode::ExactIn, Ok(leg(WSOL_MINT, BONK, 1_000, 2_000, 5, "pool-a")));
        h.quote_api
            .set_quote(SwapMode::ExactOut, Ok(exact_out(leg(BONK, WSOL_MINT, 2_020, 1_000, 5, "pool-b"))));

        let outcome = h.engine.run_cycle(&bonk()).await;
        assert!(matches!(outcome, CycleOutcome::Rejected(RejectReason::Unprofitable { .. })));
        assert_eq!(h.quote_api.swap_calls(), 0);
        assert!(h.sink.sends().is_empty());
    }

    #[tokio::test]
    async fn test_profitable_cycle_dispatches_and_broadcasts() {
        let h = harness(vec![bonk()]);
        h.writers.set_balance(10_000);
        h.writers.set_slot(500);
        h.writers.push_blockhash(Hash::new_unique());
        h.quote_api.set_quote(SwapMode::ExactIn, Ok(leg(WSOL_MINT, BONK, 1_000, 2_000, 498, "pool-a")));
        h.quote_api
            .set_quote(SwapMode::ExactOut, Ok(exact_out(leg(BONK, WSOL_MINT, 1_990, 1_000, 499, "pool-b"))));

        let outcome = h.engine.run_cycle(&bonk()).await;
        let (candidate, task) = match outcome {
            CycleOutcome::Dispatched { candidate, task } => (candidate, task),
            other => panic!("expected dispatch, got {:?}", other),
        };
        assert_eq!(candidate.trade_size, 1_000);
        assert!(candidate.profit_ratio > 0.0);

        let sends = task.await.unwrap();
        // One blockhash, both delivery classes.
        assert_eq!(sends.len(), 2);
        assert_eq!(h.quote_api.swap_calls(), 1);

        let merged = h.quote_api.last_swap_quote().unwrap();
        assert_eq!(merged.route_plan.len(), 2);
        assert_eq!(merged.output_mint, WSOL_MINT);

        let records = h.sink.sends();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.start_slot == 500));
        assert!(records.iter().all(|r| r.quote0_slot == Some(498) && r.quote1_slot == Some(499)));
        assert_eq!(h.registry.watched_signatures().len(), 1);
    }

    #[tokio::test]
    async fn test_slot_advancing_during_quotes_is_seen_by_filter() {
        let mut decision = DecisionConfig::default();
        decision.filters.slot_latency = true;
        decision.filters.max_slot_lag = 3;
        let h = harness_with(vec![bonk()], decision);
        h.writers.set_balance(10_000);
        h.writers.set_slot(500);
        h.writers.push_blockhash(Hash::new_unique());
        h.quote_api.set_quote(SwapMode::ExactIn, Ok(leg(WSOL_MINT, BONK, 1_000, 2_000, 498, "pool-a")));
        h.quote_api
            .set_quote(SwapMode::ExactOut, Ok(exact_out(leg(BONK, WSOL_MINT, 1_990, 1_000, 499, "pool-b"))));

        // Fresh against slot 500, stale against the slot reached in flight.
        let writers = h.writers.clone();
        h.quote_api.on_quote(move || writers.set_slot(510));

        let outcome = h.engine.run_cycle(&bonk()).await;
        match outcome {
            CycleOutcome::Rejected(RejectReason::StaleQuote { latest_slot, .. }) => {
                assert_eq!(latest_slot, 510)
            }
            other => panic!("expected stale quote, got {:?}", other),
        }
        assert_eq!(h.quote_api.swap_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_blockhash_window_drops_candidate() {
        let h = harness(vec![bonk()]);
        h.writers.set_balance(10_000);
        h.quote_api.set_quote(SwapMode::ExactIn, Ok(leg(WSOL_MINT, BONK, 1_000, 2_000, 5, "pool-a")));
        h.quote_api
            .set_quote(SwapMode::ExactOut, Ok(exact_out(leg(BONK, WSOL_MINT, 1_990, 1_000, 5, "pool-b"))));

        match h.engine.run_cycle(&bonk()).await {
            CycleOutcome::Dispatched { task, .. } => assert!(task.await.unwrap().is_empty()),
            other => panic!("expected dispatch, got {:?}", other),
        }
        assert!(h.sink.sends().is_empty());
    }

    #[tokio::test]
    async fn test_run_rejects_empty_pair_list() {
        let h = harness(vec![]);
        assert!(h.engine.run().await.is_err());
    }
}
