//! Connection-owning subscription tracker
//!
//! One websocket carries every subscription. Callers register interest
//! synchronously through [`SubscriptionRegistry`]; requests are queued and
//! written once the socket is open. Account changes are fanned out on a
//! broadcast channel.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::book::{BookEvent, BookSettings, Effects, SubscriptionBook};
use super::protocol::{InboundMessage, RpcRequest, SubscriptionMethod};
use crate::infrastructure::log_sink::LogSink;
use crate::shared::errors::SubscriptionError;
use crate::shared::types::SubscriptionRecord;

/// Registration surface used by the broadcaster and the lookup-table cache
pub trait SubscriptionRegistry: Send + Sync {
    /// Track confirmation of a sent transaction
    fn watch_signature(&self, signature: &str) -> u64;

    /// Track changes to an account
    fn watch_account(&self, address: &str) -> u64;

    fn unwatch_account(&self, address: &str);
}

/// Change notification for a watched account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountChange {
    pub address: String,
    pub slot: u64,
}

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub ws_url: String,
    pub ping_interval: Duration,
    pub sweep_interval: Duration,
    pub reconnect_delay: Duration,
}

/// Pending sink write, applied strictly in queue order
#[derive(Debug)]
enum SinkWrite {
    Insert(SubscriptionRecord),
    Status {
        signature: String,
        land_slot: Option<u64>,
        status: &'static str,
    },
}

pub struct SubscriptionTracker {
    book: Mutex<SubscriptionBook>,
    outbound: mpsc::UnboundedSender<RpcRequest>,
    changes: broadcast::Sender<AccountChange>,
    sink_writes: mpsc::UnboundedSender<SinkWrite>,
    settings: TrackerSettings,
}

/// Queue side of the tracker, consumed by [`SubscriptionTracker::start`]
pub struct OutboundQueue(mpsc::UnboundedReceiver<RpcRequest>);

impl SubscriptionTracker {
    /// `last_id` seeds the local id counter, normally the sink's last id.
    /// Spawns the sink writer, so it must run inside a tokio runtime.
    pub fn new(
        settings: TrackerSettings,
        book_settings: BookSettings,
        last_id: u64,
        sink: Arc<dyn LogSink>,
    ) -> (Arc<Self>, OutboundQueue) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(1024);
        let (sink_writes, sink_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_sink_writer(sink, sink_rx));
        let tracker = Arc::new(Self {
            book: Mutex::new(SubscriptionBook::new(book_settings, last_id)),
            outbound,
            changes,
            sink_writes,
            settings,
        });
        (tracker, OutboundQueue(outbound_rx))
    }

    /// Spawn the connection loop and the sweeper
    pub fn start(self: &Arc<Self>, queue: OutboundQueue) -> Vec<JoinHandle<()>> {
        let connection = {
            let tracker = self.clone();
            tokio::spawn(async move { tracker.run_connection(queue.0).await })
        };
        let sweeper = {
            let tracker = self.clone();
            tokio::spawn(async move { tracker.run_sweeper().await })
        };
        vec![connection, sweeper]
    }

    pub fn account_changes(&self) -> broadcast::Receiver<AccountChange> {
        self.changes.subscribe()
    }

    pub fn tracked(&self) -> usize {
        self.book.lock().len()
    }

    /// Parse and dispatch one inbound text frame
    pub fn handle_text(&self, text: &str) -> Result<(), SubscriptionError> {
        let message: InboundMessage =
            serde_json::from_str(text).map_err(|e| SubscriptionError::Protocol(e.to_string()))?;
        let effects = self.book.lock().handle_message(message);
        self.apply(effects);
        Ok(())
    }

    /// Time out overdue entries and drop expired ones
    pub fn sweep(&self) {
        let effects = self.book.lock().sweep(Instant::now());
        self.apply(effects);
    }

    /// Re-derive remote linkage on a fresh connection. Returns the requests
    /// to write before anything else.
    pub fn resubscribe_all(&self) -> Vec<RpcRequest> {
        let effects = self.book.lock().on_reconnect();
        let requests = effects.requests;
        self.apply(Effects {
            requests: Vec::new(),
            events: effects.events,
        });
        requests
    }

    fn enqueue(&self, requests: Vec<RpcRequest>) {
        for request in requests {
            if self.outbound.send(request).is_err() {
                warn!("{}", SubscriptionError::QueueClosed);
                return;
            }
        }
    }

    fn apply(&self, effects: Effects) {
        self.enqueue(effects.requests);
        for event in effects.events {
            self.on_event(event);
        }
    }

    fn on_event(&self, event: BookEvent) {
        match event {
            BookEvent::Confirmed { id, signature, slot, err } => {
                match &err {
                    Some(err) => info!("🧾 Signature {} landed in slot {} with error {}", signature, slot, err),
                    None => info!("🎯 Signature {} landed in slot {}", signature, slot),
                }
                debug!("Subscription {} done", id);
                self.persist_status(signature, Some(slot), "done");
            }
            BookEvent::AccountChanged { address, slot } => {
                debug!("Account {} changed at slot {}", address, slot);
                // No receivers is fine: nobody caches this account yet.
                let _ = self.changes.send(AccountChange { address, slot });
            }
            BookEvent::TimedOut { id, method, param } => {
                debug!("Subscription {} ({}) timed out", id, param);
                if method == SubscriptionMethod::Signature {
                    self.persist_status(param, None, "timeout");
                }
            }
            BookEvent::Unsubscribed { id, param, status } => {
                debug!("Subscription {} ({}) unsubscribed: {}", id, param, status);
            }
            BookEvent::Dropped { id, param } => {
                debug!("Subscription {} ({}) dropped", id, param);
            }
            BookEvent::Rejected { id, error } => {
                warn!("⚠️ Subscription request {:?} rejected: {}", id, error);
            }
        }
    }

    fn persist_status(&self, signature: String, land_slot: Option<u64>, status: &'static str) {
        self.queue_sink_write(SinkWrite::Status {
            signature,
            land_slot,
            status,
        });
    }

    fn persist_new(&self, signature: &str) {
        self.queue_sink_write(SinkWrite::Insert(SubscriptionRecord {
            signature: signature.to_string(),
            land_slot: None,
            status: "processing".to_string(),
        }));
    }

    fn queue_sink_write(&self, write: SinkWrite) {
        if let Err(e) = self.sink_writes.send(write) {
            warn!("⚠️ Sink writer stopped, dropping {:?}", e.0);
        }
    }

    async fn run_sweeper(self: Arc<Self>) {
        let mut ticker = interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.sweep();
            debug!("Subscription sweep done, {} tracked", self.tracked());
        }
    }

    async fn run_connection(self: Arc<Self>, mut outbound: mpsc::UnboundedReceiver<RpcRequest>) {
        loop {
            match self.connect_and_stream(&mut outbound).await {
                Ok(()) => {
                    warn!("🔌 Subscription websocket closed, reconnecting in {:?}", self.settings.reconnect_delay);
                }
                Err(e) => {
                    warn!("🔌 Subscription websocket error: {:#}, reconnecting in {:?}", e, self.settings.reconnect_delay);
                }
            }
            sleep(self.settings.reconnect_delay).await;
        }
    }

    async fn connect_and_stream(&self, outbound: &mut mpsc::UnboundedReceiver<RpcRequest>) -> Result<()> {
        let (ws_stream, _) = connect_async(self.settings.ws_url.as_str())
            .await
            .with_context(|| format!("connect to {}", self.settings.ws_url))?;
        info!("✅ Subscription websocket connected to {}", self.settings.ws_url);

        let (mut write, mut read) = ws_stream.split();

        // Whatever was queued while disconnected is covered by the resubscribe.
        while outbound.try_recv().is_ok() {}
        let resubscribe = self.resubscribe_all();
        if !resubscribe.is_empty() {
            info!("🔁 Re-issuing {} subscriptions", resubscribe.len());
        }
        for request in resubscribe {
            write
                .send(Message::Text(encode(&request)?))
                .await
                .context("send resubscribe")?;
        }

        let mut ping = interval(self.settings.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping.tick() => {
                    write.send(Message::Ping(Vec::new())).await.context("send ping")?;
                }
                request = outbound.recv() => {
                    let Some(request) = request else {
                        return Ok(());
                    };
                    write.send(Message::Text(encode(&request)?)).await.context("send request")?;
                    debug!("➡️ {} id={}", request.method, request.id);
                }
                frame = read.next() => {
                    let Some(frame) = frame else {
                        return Err(anyhow::anyhow!("websocket stream ended"));
                    };
                    match frame {
                        Ok(Message::Text(text)) => {
                            if let Err(e) = self.handle_text(&text) {
                                debug!("Ignoring frame: {}", e);
                            }
                        }
                        Ok(Message::Ping(payload)) => {
                            write.send(Message::Pong(payload)).await.context("send pong")?;
                        }
                        Ok(Message::Close(frame)) => {
                            debug!(?frame, "websocket close");
                            return Ok(());
                        }
                        Ok(_) => {}
                        Err(e) => {
                            return Err(SubscriptionError::Transport(e.to_string()).into());
                        }
                    }
                }
            }
        }
    }
}

/// Single consumer of the sink queue, so an update never overtakes its insert
async fn run_sink_writer(sink: Arc<dyn LogSink>, mut writes: mpsc::UnboundedReceiver<SinkWrite>) {
    while let Some(write) = writes.recv().await {
        match write {
            SinkWrite::Insert(record) => {
                if let Err(e) = sink.record_subscription(&record).await {
                    error!("❌ Failed to persist subscription for {}: {}", record.signature, e);
                }
            }
            SinkWrite::Status {
                signature,
                land_slot,
                status,
            } => {
                if let Err(e) = sink.update_subscription(&signature, land_slot, status).await {
                    error!("❌ Failed to persist subscription status for {}: {}", signature, e);
                }
            }
        }
    }
}

fn encode(request: &RpcRequest) -> Result<String> {
    serde_json::to_string(request).context("encode request")
}

impl SubscriptionRegistry for SubscriptionTracker {
    fn watch_signature(&self, signature: &str) -> u64 {
        let (id, created, effects) =
            self.book
                .lock()
                .subscribe(SubscriptionMethod::Signature, signature, Instant::now());
        if created {
            self.persist_new(signature);
        }
        self.apply(effects);
        id
    }

    fn watch_account(&self, address: &str) -> u64 {
        let (id, _, effects) = self
            .book
            .lock()
            .subscribe(SubscriptionMethod::Account, address, Instant::now());
        self.apply(effects);
        id
    }

    fn unwatch_account(&self, address: &str) {
        let effects = self.book.lock().unsubscribe(address);
        self.apply(effects);
    }
}
