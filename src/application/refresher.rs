//! Timer-driven refresh of the shared market snapshots
//!
//! Each snapshot cell has exactly one refresh task. The slot task owns both
//! the chain fetch and the local one-slot-per-tick extrapolation.

use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::execution::lookup_cache::LookupTableCache;
use crate::infrastructure::blockchain::ledger::LedgerReader;
use crate::infrastructure::blockchain::priority_fee::PriorityFeeOracle;
use crate::infrastructure::subscription::AccountChange;
use crate::shared::errors::AppError;
use crate::shared::state::MarketWriters;

#[derive(Debug, Clone)]
pub struct RefreshIntervals {
    pub balance: Duration,
    pub blockhash: Duration,
    pub slot_fetch: Duration,
    pub slot_tick: Duration,
    pub priority_fee: Duration,
}

impl Default for RefreshIntervals {
    fn default() -> Self {
        Self {
            balance: Duration::from_millis(300_000),
            blockhash: Duration::from_millis(10_000),
            slot_fetch: Duration::from_millis(10_000),
            slot_tick: Duration::from_millis(420),
            priority_fee: Duration::from_millis(30_000),
        }
    }
}

pub struct StateRefresher {
    ledger: Arc<dyn LedgerReader>,
    fee_oracle: Arc<dyn PriorityFeeOracle>,
    writers: MarketWriters,
    /// Base-asset token account whose balance sizes trades
    token_account: Pubkey,
    intervals: RefreshIntervals,
}

impl StateRefresher {
    pub fn new(
        ledger: Arc<dyn LedgerReader>,
        fee_oracle: Arc<dyn PriorityFeeOracle>,
        writers: MarketWriters,
        token_account: Pubkey,
        intervals: RefreshIntervals,
    ) -> Self {
        Self {
            ledger,
            fee_oracle,
            writers,
            token_account,
            intervals,
        }
    }

    pub async fn refresh_balance(&self) -> Result<u64, AppError> {
        let balance = self.ledger.token_balance(&self.token_account).await?;
        self.writers.set_balance(balance);
        Ok(balance)
    }

    pub async fn refresh_blockhash(&self) -> Result<(), AppError> {
        let hash = self.ledger.latest_blockhash().await?;
        self.writers.push_blockhash(hash);
        Ok(())
    }

    pub async fn refresh_slot(&self) -> Result<u64, AppError> {
        let slot = self.ledger.slot().await?;
        self.writers.set_slot(slot);
        Ok(slot)
    }

    pub async fn refresh_priority_fees(&self) -> Result<(), AppError> {
        let levels = self.fee_oracle.estimate().await?;
        debug!(
            "Priority fees: extreme {} high {} medium {} low {}",
            levels.extreme, levels.high, levels.medium, levels.low
        );
        self.writers.set_priority_fees(levels);
        Ok(())
    }

    /// Fill every snapshot once before the engine starts. Failures are
    /// logged; the timers will retry.
    pub async fn prime(&self) {
        let (balance, blockhash, slot, fees) = tokio::join!(
            self.refresh_balance(),
            self.refresh_blockhash(),
            self.refresh_slot(),
            self.refresh_priority_fees(),
        );

        match balance {
            Ok(b) => info!("✅ Base balance: {}", b),
            Err(e) => warn!("⚠️ Initial balance fetch failed: {}", e),
        }
        if let Err(e) = blockhash {
            warn!("⚠️ Initial blockhash fetch failed: {}", e);
        }
        match slot {
            Ok(s) => info!("✅ Current slot: {}", s),
            Err(e) => warn!("⚠️ Initial slot fetch failed: {}", e),
        }
        if let Err(e) = fees {
            warn!("⚠️ Initial priority fee estimate failed: {}", e);
        }
    }

    /// Spawn one task per snapshot cell
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            self.spawn_loop(self.intervals.balance, "balance", |r| async move {
                r.refresh_balance().await.map(|_| ())
            }),
            self.spawn_loop(self.intervals.blockhash, "blockhash", |r| async move {
                r.refresh_blockhash().await
            }),
            self.spawn_loop(self.intervals.priority_fee, "priority fee", |r| async move {
                r.refresh_priority_fees().await
            }),
            self.spawn_slot_loop(),
        ]
    }

    fn spawn_loop<F, Fut>(self: &Arc<Self>, period: Duration, label: &'static str, refresh: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), AppError>> + Send,
    {
        let refresher = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately and prime() already covered it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = refresh(refresher.clone()).await {
                    warn!("⚠️ {} refresh failed: {}", label, e);
                }
            }
        })
    }

    fn spawn_slot_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            let mut fetch = interval(refresher.intervals.slot_fetch);
            let mut tick = interval(refresher.intervals.slot_tick);
            fetch.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            fetch.tick().await;
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = fetch.tick() => {
                        if let Err(e) = refresher.refresh_slot().await {
                            warn!("⚠️ slot refresh failed: {}", e);
                        }
                    }
                    _ = tick.tick() => refresher.writers.tick_slot(),
                }
            }
        })
    }
}

/// Re-fetch a cached lookup table after a change notification
pub async fn handle_account_change(
    cache: &LookupTableCache,
    reader: &dyn LedgerReader,
    change: &AccountChange,
) -> bool {
    let address = match Pubkey::from_str(&change.address) {
        Ok(address) => address,
        Err(e) => {
            warn!("⚠️ Ignoring change for invalid address {}: {}", change.address, e);
            return false;
        }
    };
    let refreshed = cache.apply_change(&address, change.slot, reader).await;
    if refreshed {
        debug!("Lookup table {} refreshed at slot {}", address, change.slot);
    }
    refreshed
}

/// Listen for account changes and keep the lookup-table cache current
pub fn spawn_lookup_refresh(
    cache: Arc<LookupTableCache>,
    reader: Arc<dyn LedgerReader>,
    mut changes: broadcast::Receiver<AccountChange>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    handle_account_change(&cache, reader.as_ref(), &change).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("⚠️ Lookup table listener skipped {} notifications", skipped);
                }
                Err(RecvError::Closed) => {
                    info!("Account change channel closed, lookup table listener stopping");
                    break;
                }
            }
        }
    })
}
