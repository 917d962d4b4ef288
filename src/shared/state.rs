//! Shared market snapshots: one writer per cell, any number of readers

use solana_sdk::hash::Hash;
use tokio::sync::watch;

use crate::domain::execution::blockhash_window::BlockhashWindow;
use crate::shared::types::PriorityFeeLevels;

/// Write side of the market snapshots. Each field is owned by exactly one
/// refresh task.
pub struct MarketWriters {
    pub slot: watch::Sender<u64>,
    pub balance: watch::Sender<u64>,
    pub blockhashes: watch::Sender<BlockhashWindow>,
    pub priority_fees: watch::Sender<Option<PriorityFeeLevels>>,
}

/// Read side. Every accessor returns a point-in-time copy.
#[derive(Clone)]
pub struct MarketView {
    slot: watch::Receiver<u64>,
    balance: watch::Receiver<u64>,
    blockhashes: watch::Receiver<BlockhashWindow>,
    priority_fees: watch::Receiver<Option<PriorityFeeLevels>>,
}

/// Create the snapshot cells with a blockhash window of `window_size`.
pub fn market_state(window_size: usize) -> (MarketWriters, MarketView) {
    let (slot_tx, slot_rx) = watch::channel(0);
    let (balance_tx, balance_rx) = watch::channel(0);
    let (hash_tx, hash_rx) = watch::channel(BlockhashWindow::new(window_size));
    let (fee_tx, fee_rx) = watch::channel(None);

    (
        MarketWriters {
            slot: slot_tx,
            balance: balance_tx,
            blockhashes: hash_tx,
            priority_fees: fee_tx,
        },
        MarketView {
            slot: slot_rx,
            balance: balance_rx,
            blockhashes: hash_rx,
            priority_fees: fee_rx,
        },
    )
}

impl MarketWriters {
    /// Replace the estimate with a fetched chain slot, discarding local ticks
    pub fn set_slot(&self, slot: u64) {
        self.slot.send_replace(slot);
    }

    /// Advance the local slot estimate by one
    pub fn tick_slot(&self) {
        self.slot.send_modify(|s| *s += 1);
    }

    pub fn set_balance(&self, balance: u64) {
        self.balance.send_replace(balance);
    }

    pub fn push_blockhash(&self, hash: Hash) {
        self.blockhashes.send_modify(|window| {
            window.push(hash);
        });
    }

    pub fn set_priority_fees(&self, levels: PriorityFeeLevels) {
        self.priority_fees.send_replace(Some(levels));
    }
}

impl MarketView {
    pub fn latest_slot(&self) -> u64 {
        *self.slot.borrow()
    }

    pub fn balance(&self) -> u64 {
        *self.balance.borrow()
    }

    pub fn blockhashes(&self) -> Vec<Hash> {
        self.blockhashes.borrow().snapshot()
    }

    pub fn priority_fees(&self) -> Option<PriorityFeeLevels> {
        *self.priority_fees.borrow()
    }
}
