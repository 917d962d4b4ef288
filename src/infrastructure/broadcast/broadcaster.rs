//! Fan-out of signed copies to direct nodes and relays, with per-destination retry

use futures::future::{join_all, BoxFuture, FutureExt};
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use super::bundle_relay::BundleRelay;
use super::rpc_sender::TransactionSender;
use crate::domain::execution::assembler::AssembledBatch;
use crate::infrastructure::log_sink::LogSink;
use crate::infrastructure::subscription::SubscriptionRegistry;
use crate::shared::types::{ChannelKind, DeliveryMode, SendRecord};
use crate::shared::utils::{now_millis, retry_with_delay, RetryPolicy};

/// Per-candidate metadata carried into the send log
#[derive(Debug, Clone)]
pub struct SendContext {
    pub label: String,
    pub start_slot: u64,
    pub quote0_slot: Option<u64>,
    pub quote1_slot: Option<u64>,
}

/// One accepted send
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub channel: ChannelKind,
    pub endpoint: String,
    /// Signature for direct nodes, bundle id for relays
    pub id: String,
    pub start_slot: u64,
    pub sent_at_ms: i64,
    pub elapsed_ms: u64,
    pub attempts: u32,
}

pub struct Broadcaster {
    nodes: Vec<Arc<dyn TransactionSender>>,
    relays: Vec<Arc<dyn BundleRelay>>,
    mode: DeliveryMode,
    retry: RetryPolicy,
    sink: Arc<dyn LogSink>,
    registry: Arc<dyn SubscriptionRegistry>,
}

impl Broadcaster {
    pub fn new(
        nodes: Vec<Arc<dyn TransactionSender>>,
        relays: Vec<Arc<dyn BundleRelay>>,
        mode: DeliveryMode,
        retry: RetryPolicy,
        sink: Arc<dyn LogSink>,
        registry: Arc<dyn SubscriptionRegistry>,
    ) -> Self {
        Self {
            nodes,
            relays,
            mode,
            retry,
            sink,
            registry,
        }
    }

    /// Issue every send at once and wait for all of them to settle.
    /// Copy `i` goes to destination `i % count` within its class. Failures
    /// are logged and left out of the result.
    pub async fn broadcast(&self, batch: &AssembledBatch, ctx: &SendContext) -> Vec<SendOutcome> {
        let mut sends: Vec<BoxFuture<'_, Option<SendOutcome>>> = Vec::with_capacity(batch.len());

        if self.mode.uses_rpc() && !self.nodes.is_empty() {
            for (i, tx) in batch.plain.iter().enumerate() {
                let node = self.nodes[i % self.nodes.len()].as_ref();
                sends.push(self.send_to_node(node, tx, ctx).boxed());
            }
        }
        if self.mode.uses_relays() && !self.relays.is_empty() {
            for (i, tx) in batch.incentive.iter().enumerate() {
                let relay = self.relays[i % self.relays.len()].as_ref();
                sends.push(self.send_to_relay(relay, tx, ctx).boxed());
            }
        }

        let issued = sends.len();
        let outcomes: Vec<SendOutcome> = join_all(sends).await.into_iter().flatten().collect();
        info!("📦 [{}] {}/{} sends accepted", ctx.label, outcomes.len(), issued);
        outcomes
    }

    async fn send_to_node(
        &self,
        node: &dyn TransactionSender,
        tx: &VersionedTransaction,
        ctx: &SendContext,
    ) -> Option<SendOutcome> {
        let started = Instant::now();
        let sent_at_ms = now_millis();
        let mut attempts = 0;

        let result = retry_with_delay(self.retry, node.endpoint(), || {
            attempts += 1;
            node.send(tx)
        })
        .await;

        match result {
            Ok(signature) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!("🚀 [{}] rpc {} -> {} ({}ms)", ctx.label, node.endpoint(), signature, elapsed_ms);
                self.registry.watch_signature(&signature);
                let outcome = SendOutcome {
                    channel: ChannelKind::Rpc,
                    endpoint: node.endpoint().to_string(),
                    id: signature,
                    start_slot: ctx.start_slot,
                    sent_at_ms,
                    elapsed_ms,
                    attempts,
                };
                self.persist(&outcome, ctx).await;
                Some(outcome)
            }
            Err((e, attempts)) => {
                warn!("❌ [{}] rpc {} failed after {} attempts: {}", ctx.label, node.endpoint(), attempts, e);
                None
            }
        }
    }

    async fn send_to_relay(
        &self,
        relay: &dyn BundleRelay,
        tx: &VersionedTransaction,
        ctx: &SendContext,
    ) -> Option<SendOutcome> {
        let started = Instant::now();
        let sent_at_ms = now_millis();
        let bundle = std::slice::from_ref(tx);
        let mut attempts = 0;

        let result = retry_with_delay(self.retry, relay.endpoint(), || {
            attempts += 1;
            relay.send_bundle(bundle)
        })
        .await;

        match result {
            Ok(bundle_id) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!("🚀 [{}] relay {} -> {} ({}ms)", ctx.label, relay.endpoint(), bundle_id, elapsed_ms);
                let outcome = SendOutcome {
                    channel: ChannelKind::Relay,
                    endpoint: relay.endpoint().to_string(),
                    id: bundle_id,
                    start_slot: ctx.start_slot,
                    sent_at_ms,
                    elapsed_ms,
                    attempts,
                };
                self.persist(&outcome, ctx).await;
                Some(outcome)
            }
            Err((e, attempts)) => {
                warn!("❌ [{}] relay {} failed after {} attempts: {}", ctx.label, relay.endpoint(), attempts, e);
                None
            }
        }
    }

    async fn persist(&self, outcome: &SendOutcome, ctx: &SendContext) {
        let record = SendRecord {
            signature: outcome.id.clone(),
            start_slot: outcome.start_slot,
            endpoint: outcome.endpoint.clone(),
            quote0_slot: ctx.quote0_slot,
            quote1_slot: ctx.quote1_slot,
        };
        if let Err(e) = self.sink.record_send(&record).await {
            error!("❌ Failed to persist send {} to {}: {}", record.signature, record.endpoint, e);
        }
    }
}
