//! Error handling for the application

use thiserror::Error;

/// Quoting / transaction-building collaborator errors
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    #[error("Quote request failed: {0}")]
    RequestFailed(String),

    #[error("Quote API returned status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Invalid quote payload: {0}")]
    InvalidPayload(String),

    #[error("Swap instructions request failed: {0}")]
    InstructionsFailed(String),
}

/// Transaction assembly errors
#[derive(Error, Debug, Clone)]
pub enum AssemblyError {
    #[error("Failed to fetch swap instructions: {0}")]
    SwapInstructions(#[from] QuoteError),

    #[error("Invalid instruction from builder: {0}")]
    InvalidInstruction(String),

    #[error("Lookup table {address} unavailable: {reason}")]
    LookupTable { address: String, reason: String },

    #[error("No recent blockhash available")]
    NoBlockhash,

    #[error("Message compile failed: {0}")]
    Compile(String),

    #[error("Signing failed: {0}")]
    Signing(String),
}

/// Delivery errors (direct nodes and relays)
#[derive(Error, Debug, Clone)]
pub enum DeliveryError {
    #[error("RPC send to {endpoint} failed: {reason}")]
    Rpc { endpoint: String, reason: String },

    #[error("Relay send to {endpoint} failed: {reason}")]
    Relay { endpoint: String, reason: String },

    #[error("Transaction encoding failed: {0}")]
    Encoding(String),
}

/// Pub/sub subscription errors
#[derive(Error, Debug, Clone)]
pub enum SubscriptionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Outbound queue closed")]
    QueueClosed,
}

/// Durable log sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// General application error
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Blockchain error: {0}")]
    BlockchainError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl From<QuoteError> for AppError {
    fn from(err: QuoteError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<AssemblyError> for AppError {
    fn from(err: AssemblyError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        AppError::ExecutionError(err.to_string())
    }
}

impl From<SubscriptionError> for AppError {
    fn from(err: SubscriptionError) -> Self {
        AppError::BlockchainError(err.to_string())
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_app_variant_has_a_source() {
        let sink: AppError = SinkError::Database(rusqlite::Error::InvalidQuery).into();
        assert!(matches!(sink, AppError::DatabaseError(_)));

        let subscription: AppError = SubscriptionError::QueueClosed.into();
        assert!(matches!(subscription, AppError::BlockchainError(_)));

        let delivery: AppError = DeliveryError::Rpc {
            endpoint: "node-a".to_string(),
            reason: "down".to_string(),
        }
        .into();
        assert!(matches!(delivery, AppError::ExecutionError(ref m) if m.contains("node-a")));
    }
}
