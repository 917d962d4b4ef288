// src/app.rs
use anyhow::{Context, Result};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{read_keypair_file, Signer},
};
use spl_associated_token_account::get_associated_token_address;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use jup_arb::application::{spawn_lookup_refresh, DecisionEngine, StateRefresher};
use jup_arb::domain::execution::{LookupTableCache, TransactionAssembler};
use jup_arb::infrastructure::blockchain::{QuickNodeFeeOracle, SolanaLedger};
use jup_arb::infrastructure::broadcast::{
    Broadcaster, BundleRelay, JitoRelay, RpcNodeSender, TransactionSender,
};
use jup_arb::infrastructure::jupiter::JupiterClient;
use jup_arb::infrastructure::log_sink::{LogSink, SqliteLogSink};
use jup_arb::infrastructure::subscription::SubscriptionTracker;
use jup_arb::shared::state::market_state;

use crate::config::Config;

fn open_sink(cfg: &Config) -> Result<Arc<dyn LogSink>> {
    let sink = match &cfg.log_sink.path {
        Some(path) => SqliteLogSink::open(path, cfg.log_sink.reset_on_start)
            .with_context(|| format!("open log sink {}", path))?,
        None => {
            info!("No log_sink.path configured, using an in-memory log sink");
            SqliteLogSink::in_memory().context("open in-memory log sink")?
        }
    };
    Ok(Arc::new(sink))
}

fn parse_pubkeys(values: &[String], what: &str) -> Result<Vec<Pubkey>> {
    values
        .iter()
        .map(|v| Pubkey::from_str(v).with_context(|| format!("invalid {} {}", what, v)))
        .collect()
}

pub async fn run(cfg: Config) -> Result<()> {
    info!("Starting jup-arb executor");

    let payer = read_keypair_file(&cfg.wallet.keypair)
        .map_err(|e| anyhow::anyhow!("Failed to load keypair {}: {}", cfg.wallet.keypair, e))?;
    let payer = Arc::new(payer);
    info!("Loaded keypair: {}", payer.pubkey());

    let commitment = cfg.commitment()?;
    let mode = cfg.delivery_mode();
    info!("Delivery mode: {:?}", mode);

    // Persistence and subscription tracking come first so the id counter
    // continues from the last persisted subscription.
    let sink = open_sink(&cfg)?;
    let last_id = sink
        .last_subscription_id()
        .await
        .context("read last subscription id")?;
    let (tracker, queue) =
        SubscriptionTracker::new(cfg.tracker_settings(), cfg.book_settings(), last_id, sink.clone());
    let mut handles: Vec<JoinHandle<()>> = tracker.start(queue);
    info!("✅ Subscription tracker connecting to {} (last id {})", cfg.rpc.ws_url, last_id);

    let ledger = Arc::new(SolanaLedger::new(cfg.rpc.url.clone(), commitment));
    let fee_oracle = Arc::new(QuickNodeFeeOracle::new(cfg.priority_fee_url()));

    let base_mint = Pubkey::from_str(&cfg.pairs.base.mint)
        .with_context(|| format!("invalid base mint {}", cfg.pairs.base.mint))?;
    let token_account = get_associated_token_address(&payer.pubkey(), &base_mint);
    info!("Base token account: {}", token_account);

    let (writers, market) = market_state(cfg.trade.tx_multiplier);
    let refresher = Arc::new(StateRefresher::new(
        ledger.clone(),
        fee_oracle,
        writers,
        token_account,
        cfg.refresh_intervals(),
    ));
    refresher.prime().await;
    handles.extend(refresher.spawn());

    let cache = Arc::new(LookupTableCache::new(cfg.trade.max_lookup_tables, tracker.clone()));
    handles.push(spawn_lookup_refresh(cache.clone(), ledger.clone(), tracker.account_changes()));

    let quote_api = Arc::new(JupiterClient::new(cfg.jupiter.api_url.clone()));
    let tip_accounts = parse_pubkeys(&cfg.delivery.tip_accounts, "tip account")?;
    let assembler = Arc::new(TransactionAssembler::new(
        payer,
        quote_api.clone(),
        cache,
        ledger,
        cfg.trade.compute_unit_limit,
        tip_accounts,
        mode,
    ));

    let nodes: Vec<Arc<dyn TransactionSender>> = cfg
        .send_urls()
        .into_iter()
        .map(|url| Arc::new(RpcNodeSender::new(url, commitment)) as Arc<dyn TransactionSender>)
        .collect();
    let relay_client = JitoRelay::default_client();
    let relays: Vec<Arc<dyn BundleRelay>> = cfg
        .delivery
        .relay_urls
        .iter()
        .map(|url| Arc::new(JitoRelay::new(url.clone(), relay_client.clone())) as Arc<dyn BundleRelay>)
        .collect();
    info!("✅ {} direct nodes, {} relays", nodes.len(), relays.len());

    let broadcaster = Arc::new(Broadcaster::new(
        nodes,
        relays,
        mode,
        cfg.retry_policy(),
        sink,
        tracker,
    ));

    let engine = DecisionEngine::new(quote_api, market, assembler, broadcaster, cfg.engine_settings());

    let result = tokio::select! {
        result = engine.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Interrupt received, shutting down");
            Ok(())
        }
    };

    if let Err(e) = &result {
        error!("❌ Engine stopped: {}", e);
    }
    for handle in handles {
        handle.abort();
    }
    result
}
