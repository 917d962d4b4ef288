//! Subscription state machine, independent of the transport
//!
//! Entries are keyed by local id (request/ack correlation) and by remote
//! subscription id (push correlation). At most one entry exists per
//! parameter. Every mutation returns the requests to put on the wire and the
//! events the owner should act on; nothing here performs I/O.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use super::protocol::{
    InboundMessage, RpcRequest, SubscriptionMethod, ACCOUNT_NOTIFICATION, SIGNATURE_NOTIFICATION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Processing,
    Done,
    Timeout,
    Error,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Processing => "processing",
            SubscriptionStatus::Done => "done",
            SubscriptionStatus::Timeout => "timeout",
            SubscriptionStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SubscriptionStatus::Processing)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsubscribe {
    None,
    /// Requested before the remote id was known
    Deferred,
    Sent,
}

#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: u64,
    pub method: SubscriptionMethod,
    pub param: String,
    pub status: SubscriptionStatus,
    pub started_at: Instant,
    pub max_duration: Duration,
    pub remote_id: Option<u64>,
    pub result_slot: Option<u64>,
    pub result_err: Option<Value>,
    pub drop_tag: u32,
    unsubscribe: Unsubscribe,
}

#[derive(Debug, Clone)]
pub struct BookSettings {
    pub commitment: String,
    pub enable_received_notification: bool,
    pub max_signature_duration: Duration,
    pub max_account_duration: Duration,
    pub drop_tag_threshold: u32,
}

impl Default for BookSettings {
    fn default() -> Self {
        Self {
            commitment: "confirmed".to_string(),
            enable_received_notification: false,
            max_signature_duration: Duration::from_secs(60),
            max_account_duration: Duration::from_secs(86_400),
            drop_tag_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BookEvent {
    Confirmed {
        id: u64,
        signature: String,
        slot: u64,
        err: Option<Value>,
    },
    AccountChanged {
        address: String,
        slot: u64,
    },
    TimedOut {
        id: u64,
        method: SubscriptionMethod,
        param: String,
    },
    Unsubscribed {
        id: u64,
        param: String,
        status: SubscriptionStatus,
    },
    Dropped {
        id: u64,
        param: String,
    },
    Rejected {
        id: Option<u64>,
        error: Value,
    },
}

/// Output of one book mutation
#[derive(Debug, Default)]
pub struct Effects {
    pub requests: Vec<RpcRequest>,
    pub events: Vec<BookEvent>,
}

impl Effects {
    fn request(request: RpcRequest) -> Self {
        Self {
            requests: vec![request],
            events: Vec::new(),
        }
    }
}

pub struct SubscriptionBook {
    settings: BookSettings,
    next_id: u64,
    entries: HashMap<u64, Subscription>,
    by_param: HashMap<String, u64>,
    by_remote: HashMap<u64, u64>,
}

impl SubscriptionBook {
    /// `last_id` is the highest id handed out by a previous run
    pub fn new(settings: BookSettings, last_id: u64) -> Self {
        Self {
            settings,
            next_id: last_id + 1,
            entries: HashMap::new(),
            by_param: HashMap::new(),
            by_remote: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&Subscription> {
        self.entries.get(&id)
    }

    pub fn find(&self, param: &str) -> Option<&Subscription> {
        self.by_param.get(param).and_then(|id| self.entries.get(id))
    }

    /// Track `param`. Returns the local id, and `created` is true when a new
    /// entry was made. A live entry for the same parameter is reused without
    /// touching the wire; a terminal one is revived under its old id.
    pub fn subscribe(
        &mut self,
        method: SubscriptionMethod,
        param: &str,
        now: Instant,
    ) -> (u64, bool, Effects) {
        let max_duration = self.max_duration(method);

        if let Some(&id) = self.by_param.get(param) {
            let request = match self.entries.get_mut(&id) {
                Some(entry) if entry.status == SubscriptionStatus::Processing => {
                    match entry.unsubscribe {
                        Unsubscribe::None => None,
                        // Not on the wire yet, so cancelling is enough.
                        Unsubscribe::Deferred => {
                            entry.unsubscribe = Unsubscribe::None;
                            None
                        }
                        Unsubscribe::Sent => {
                            entry.unsubscribe = Unsubscribe::None;
                            entry.started_at = now;
                            Some(entry.id)
                        }
                    }
                }
                Some(entry) => {
                    entry.status = SubscriptionStatus::Processing;
                    entry.started_at = now;
                    entry.max_duration = max_duration;
                    entry.drop_tag = 0;
                    entry.result_slot = None;
                    entry.result_err = None;
                    entry.unsubscribe = Unsubscribe::None;
                    Some(entry.id)
                }
                None => None,
            };

            return match request {
                Some(id) => {
                    if let Some(remote) = self.entries.get_mut(&id).and_then(|e| e.remote_id.take()) {
                        self.by_remote.remove(&remote);
                    }
                    (id, false, Effects::request(self.subscribe_request(id, method, param)))
                }
                None => (id, false, Effects::default()),
            };
        }

        let id = self.next_id;
        self.next_id += 1;
        self.entries.insert(
            id,
            Subscription {
                id,
                method,
                param: param.to_string(),
                status: SubscriptionStatus::Processing,
                started_at: now,
                max_duration,
                remote_id: None,
                result_slot: None,
                result_err: None,
                drop_tag: 0,
                unsubscribe: Unsubscribe::None,
            },
        );
        self.by_param.insert(param.to_string(), id);

        (id, true, Effects::request(self.subscribe_request(id, method, param)))
    }

    /// Stop tracking `param`. The entry is finalized when the ack arrives.
    pub fn unsubscribe(&mut self, param: &str) -> Effects {
        let Some(&id) = self.by_param.get(param) else {
            return Effects::default();
        };
        let Some(entry) = self.entries.get_mut(&id) else {
            return Effects::default();
        };
        if entry.status.is_terminal() || entry.unsubscribe != Unsubscribe::None {
            return Effects::default();
        }

        match entry.remote_id {
            Some(remote) => {
                entry.unsubscribe = Unsubscribe::Sent;
                Effects::request(RpcRequest::unsubscribe(id, entry.method, remote))
            }
            None => {
                entry.unsubscribe = Unsubscribe::Deferred;
                Effects::default()
            }
        }
    }

    /// Dispatch one inbound frame
    pub fn handle_message(&mut self, message: InboundMessage) -> Effects {
        match message.method.as_deref() {
            None => {
                if let Some(error) = message.error {
                    return Effects {
                        requests: Vec::new(),
                        events: vec![BookEvent::Rejected { id: message.id, error }],
                    };
                }
                let (Some(id), Some(result)) = (message.id, message.result) else {
                    return Effects::default();
                };
                match result {
                    Value::Bool(ok) => self.on_unsubscribe_ack(id, ok),
                    Value::Number(n) => match n.as_u64() {
                        Some(remote) => self.on_subscribe_ack(id, remote),
                        None => Effects::default(),
                    },
                    _ => Effects::default(),
                }
            }
            Some(SIGNATURE_NOTIFICATION) => match message.params {
                Some(params) => {
                    let err = params.result.err();
                    self.on_signature_notification(params.subscription, params.result.context.slot, err)
                }
                None => Effects::default(),
            },
            Some(ACCOUNT_NOTIFICATION) => match message.params {
                Some(params) => self.on_account_notification(params.subscription, params.result.context.slot),
                None => Effects::default(),
            },
            Some(_) => Effects::default(),
        }
    }

    fn on_subscribe_ack(&mut self, id: u64, remote: u64) -> Effects {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Effects::default();
        };
        if let Some(old) = entry.remote_id.replace(remote) {
            self.by_remote.remove(&old);
        }
        self.by_remote.insert(remote, id);

        if entry.unsubscribe == Unsubscribe::Deferred {
            entry.unsubscribe = Unsubscribe::Sent;
            return Effects::request(RpcRequest::unsubscribe(id, entry.method, remote));
        }
        Effects::default()
    }

    fn on_unsubscribe_ack(&mut self, id: u64, ok: bool) -> Effects {
        let Some(entry) = self.entries.get_mut(&id) else {
            return Effects::default();
        };
        if entry.unsubscribe != Unsubscribe::Sent {
            return Effects::default();
        }
        entry.unsubscribe = Unsubscribe::None;
        entry.status = if ok {
            SubscriptionStatus::Done
        } else {
            SubscriptionStatus::Error
        };
        if let Some(remote) = entry.remote_id.take() {
            self.by_remote.remove(&remote);
        }
        Effects {
            requests: Vec::new(),
            events: vec![BookEvent::Unsubscribed {
                id,
                param: entry.param.clone(),
                status: entry.status,
            }],
        }
    }

    fn on_signature_notification(&mut self, remote: u64, slot: u64, err: Option<Value>) -> Effects {
        let Some(entry) = self.by_remote.get(&remote).and_then(|id| self.entries.get_mut(id)) else {
            return Effects::default();
        };
        entry.result_slot = Some(slot);
        entry.result_err = err.clone();
        entry.status = SubscriptionStatus::Done;
        Effects {
            requests: Vec::new(),
            events: vec![BookEvent::Confirmed {
                id: entry.id,
                signature: entry.param.clone(),
                slot,
                err,
            }],
        }
    }

    fn on_account_notification(&mut self, remote: u64, slot: u64) -> Effects {
        let Some(entry) = self.by_remote.get(&remote).and_then(|id| self.entries.get_mut(id)) else {
            return Effects::default();
        };
        entry.result_slot = Some(slot);
        Effects {
            requests: Vec::new(),
            events: vec![BookEvent::AccountChanged {
                address: entry.param.clone(),
                slot,
            }],
        }
    }

    /// Periodic cleanup. Entries that were already terminal are tagged and
    /// dropped at the threshold; then overdue processing entries time out.
    pub fn sweep(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::default();
        let threshold = self.settings.drop_tag_threshold;

        let mut dropped = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.status.is_terminal() {
                entry.drop_tag += 1;
                if entry.drop_tag >= threshold {
                    dropped.push(entry.id);
                }
            }
        }
        for id in dropped {
            if let Some(entry) = self.entries.remove(&id) {
                self.by_param.remove(&entry.param);
                if let Some(remote) = entry.remote_id {
                    self.by_remote.remove(&remote);
                }
                effects.events.push(BookEvent::Dropped { id, param: entry.param });
            }
        }

        for entry in self.entries.values_mut() {
            if entry.status == SubscriptionStatus::Processing
                && now.saturating_duration_since(entry.started_at) > entry.max_duration
            {
                entry.status = SubscriptionStatus::Timeout;
                entry.unsubscribe = Unsubscribe::None;
                effects.events.push(BookEvent::TimedOut {
                    id: entry.id,
                    method: entry.method,
                    param: entry.param.clone(),
                });
            }
        }

        effects
    }

    /// A new connection replaces the old one: remote linkage is forgotten,
    /// every processing entry is re-issued under its local id, and pending
    /// unsubscribes complete since the old subscriptions died with the socket.
    pub fn on_reconnect(&mut self) -> Effects {
        self.by_remote.clear();
        let mut effects = Effects::default();

        let mut ids: Vec<u64> = self.entries.keys().copied().collect();
        ids.sort_unstable();

        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };
            entry.remote_id = None;
            if entry.status != SubscriptionStatus::Processing {
                continue;
            }
            if entry.unsubscribe != Unsubscribe::None {
                entry.unsubscribe = Unsubscribe::None;
                entry.status = SubscriptionStatus::Done;
                effects.events.push(BookEvent::Unsubscribed {
                    id,
                    param: entry.param.clone(),
                    status: entry.status,
                });
                continue;
            }
            let (method, param) = (entry.method, entry.param.clone());
            effects.requests.push(self.subscribe_request(id, method, &param));
        }

        effects
    }

    fn max_duration(&self, method: SubscriptionMethod) -> Duration {
        match method {
            SubscriptionMethod::Signature => self.settings.max_signature_duration,
            SubscriptionMethod::Account => self.settings.max_account_duration,
        }
    }

    fn subscribe_request(&self, id: u64, method: SubscriptionMethod, param: &str) -> RpcRequest {
        match method {
            SubscriptionMethod::Signature => RpcRequest::subscribe_signature(
                id,
                param,
                &self.settings.commitment,
                self.settings.enable_received_notification,
            ),
            SubscriptionMethod::Account => {
                RpcRequest::subscribe_account(id, param, &self.settings.commitment)
            }
        }
    }
}
