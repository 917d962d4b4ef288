//! Solana pub/sub JSON-RPC messages

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// What a subscription watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionMethod {
    Signature,
    Account,
}

impl SubscriptionMethod {
    pub fn subscribe(&self) -> &'static str {
        match self {
            SubscriptionMethod::Signature => "signatureSubscribe",
            SubscriptionMethod::Account => "accountSubscribe",
        }
    }

    pub fn unsubscribe(&self) -> &'static str {
        match self {
            SubscriptionMethod::Signature => "signatureUnsubscribe",
            SubscriptionMethod::Account => "accountUnsubscribe",
        }
    }
}

pub const SIGNATURE_NOTIFICATION: &str = "signatureNotification";
pub const ACCOUNT_NOTIFICATION: &str = "accountNotification";

/// Outbound request. `id` is always the local subscription id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl RpcRequest {
    pub fn subscribe_signature(
        id: u64,
        signature: &str,
        commitment: &str,
        enable_received_notification: bool,
    ) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: SubscriptionMethod::Signature.subscribe(),
            params: json!([
                signature,
                {
                    "commitment": commitment,
                    "enableReceivedNotification": enable_received_notification,
                }
            ]),
        }
    }

    pub fn subscribe_account(id: u64, address: &str, commitment: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: SubscriptionMethod::Account.subscribe(),
            params: json!([
                address,
                {
                    "encoding": "jsonParsed",
                    "commitment": commitment,
                }
            ]),
        }
    }

    pub fn unsubscribe(id: u64, method: SubscriptionMethod, remote_id: u64) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.unsubscribe(),
            params: json!([remote_id]),
        }
    }

    /// Subscription parameter (signature or address) carried by a subscribe request
    pub fn param(&self) -> Option<&str> {
        self.params.get(0).and_then(Value::as_str)
    }
}

/// Any inbound frame: an ack `{id, result}`, an error `{id, error}`, or a
/// push `{method, params}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub params: Option<NotificationParams>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationParams {
    pub subscription: u64,
    pub result: NotificationResult,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationResult {
    pub context: NotificationContext,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationContext {
    pub slot: u64,
}

impl NotificationResult {
    /// Transaction error reported by a signature notification, if any
    pub fn err(&self) -> Option<Value> {
        self.value
            .as_ref()
            .and_then(|v| v.get("err"))
            .filter(|e| !e.is_null())
            .cloned()
    }
}
