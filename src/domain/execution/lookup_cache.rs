//! Bounded, push-refreshed cache of address lookup tables

use futures::future::try_join_all;
use parking_lot::Mutex;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::pubkey::Pubkey;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::infrastructure::blockchain::ledger::{LedgerReader, LookupTableSnapshot};
use crate::infrastructure::subscription::SubscriptionRegistry;
use crate::shared::errors::AssemblyError;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub table: AddressLookupTableAccount,
    pub last_known_slot: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<Pubkey, CacheEntry>,
    /// Insertion order, oldest first
    order: VecDeque<Pubkey>,
}

/// FIFO-bounded lookup-table cache. Every cached table is watched for
/// changes, and every eviction unwatches it.
pub struct LookupTableCache {
    max_entries: usize,
    inner: Mutex<CacheInner>,
    registry: Arc<dyn SubscriptionRegistry>,
}

impl LookupTableCache {
    pub fn new(max_entries: usize, registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self {
            max_entries: max_entries.max(1),
            inner: Mutex::new(CacheInner::default()),
            registry,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, address: &Pubkey) -> Option<CacheEntry> {
        self.inner.lock().entries.get(address).cloned()
    }

    /// Resolve `addresses` in order. Misses are fetched concurrently and
    /// cached; any failed fetch fails the whole resolve.
    pub async fn resolve(
        &self,
        addresses: &[Pubkey],
        reader: &dyn LedgerReader,
    ) -> Result<Vec<AddressLookupTableAccount>, AssemblyError> {
        let mut found: HashMap<Pubkey, AddressLookupTableAccount> = HashMap::new();
        let mut misses: Vec<Pubkey> = Vec::new();
        for address in addresses {
            if found.contains_key(address) || misses.contains(address) {
                continue;
            }
            match self.get(address) {
                Some(entry) => {
                    found.insert(*address, entry.table);
                }
                None => misses.push(*address),
            }
        }

        let fetched = try_join_all(misses.iter().map(|address| async move {
            reader
                .fetch_lookup_table(address)
                .await
                .map_err(|e| AssemblyError::LookupTable {
                    address: address.to_string(),
                    reason: e.to_string(),
                })
        }))
        .await?;

        for (address, snapshot) in misses.iter().zip(fetched) {
            debug!("Lookup table {} fetched at slot {}", address, snapshot.slot);
            found.insert(*address, snapshot.table.clone());
            self.insert(snapshot);
        }

        addresses
            .iter()
            .map(|address| {
                found.get(address).cloned().ok_or_else(|| AssemblyError::LookupTable {
                    address: address.to_string(),
                    reason: "not resolved".to_string(),
                })
            })
            .collect()
    }

    /// Insert a freshly fetched table. A new address is watched; entries
    /// pushed out by the bound are unwatched. Returns the evicted addresses.
    pub fn insert(&self, snapshot: LookupTableSnapshot) -> Vec<Pubkey> {
        let address = snapshot.table.key;
        let entry = CacheEntry {
            table: snapshot.table,
            last_known_slot: snapshot.slot,
        };

        let evicted = {
            let mut inner = self.inner.lock();
            if let Some(existing) = inner.entries.get_mut(&address) {
                // A concurrent resolve got here first; keep the newer copy.
                if entry.last_known_slot >= existing.last_known_slot {
                    *existing = entry;
                }
                return Vec::new();
            }

            let mut evicted = Vec::new();
            while inner.order.len() >= self.max_entries {
                match inner.order.pop_front() {
                    Some(old) => {
                        inner.entries.remove(&old);
                        evicted.push(old);
                    }
                    None => break,
                }
            }
            inner.order.push_back(address);
            inner.entries.insert(address, entry);
            evicted
        };

        for old in &evicted {
            debug!("Lookup table {} evicted", old);
            self.registry.unwatch_account(&old.to_string());
        }
        self.registry.watch_account(&address.to_string());
        evicted
    }

    /// React to a change notification: refetch when the notified slot is
    /// newer than what is cached. A failed refetch keeps the old entry.
    pub async fn apply_change(&self, address: &Pubkey, slot: u64, reader: &dyn LedgerReader) -> bool {
        let stale = match self.get(address) {
            Some(entry) => slot > entry.last_known_slot,
            None => false,
        };
        if !stale {
            return false;
        }

        match reader.fetch_lookup_table(address).await {
            Ok(snapshot) => {
                let mut inner = self.inner.lock();
                match inner.entries.get_mut(address) {
                    Some(entry) if snapshot.slot >= entry.last_known_slot => {
                        entry.table = snapshot.table;
                        entry.last_known_slot = snapshot.slot.max(slot);
                        true
                    }
                    _ => false,
                }
            }
            Err(e) => {
                warn!("⚠️ Failed to refresh lookup table {}: {}", address, e);
                false
            }
        }
    }
}
