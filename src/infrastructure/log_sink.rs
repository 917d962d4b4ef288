//! Durable append-only log of sends and confirmation subscriptions

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::shared::errors::SinkError;
use crate::shared::types::{SendRecord, SubscriptionRecord};
use crate::shared::utils::now_millis;

#[async_trait]
pub trait LogSink: Send + Sync {
    async fn record_send(&self, record: &SendRecord) -> Result<(), SinkError>;

    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<(), SinkError>;

    /// Update every subscription row for `signature`
    async fn update_subscription(
        &self,
        signature: &str,
        land_slot: Option<u64>,
        status: &str,
    ) -> Result<(), SinkError>;

    /// Highest subscription id persisted so far, 0 when empty
    async fn last_subscription_id(&self) -> Result<u64, SinkError>;
}

#[derive(Clone)]
pub struct SqliteLogSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLogSink {
    pub fn open(path: &str, reset: bool) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;
        Self::init(conn, reset)
    }

    pub fn in_memory() -> Result<Self, SinkError> {
        Self::init(Connection::open_in_memory()?, false)
    }

    fn init(conn: Connection, reset: bool) -> Result<Self, SinkError> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "synchronous", "NORMAL").ok();

        if reset {
            conn.execute("DROP TABLE IF EXISTS send_records", [])?;
            conn.execute("DROP TABLE IF EXISTS subscription_records", [])?;
            info!("🗑️ Log sink tables reset");
        }

        conn.execute(
            "CREATE TABLE IF NOT EXISTS send_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature TEXT NOT NULL,
                start_slot INTEGER NOT NULL,
                endpoint TEXT NOT NULL,
                quote0_slot INTEGER,
                quote1_slot INTEGER,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS subscription_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature TEXT NOT NULL,
                land_slot INTEGER,
                status TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_subscription_records_signature ON subscription_records(signature)",
            [],
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn subscription(&self, signature: &str) -> Result<Option<SubscriptionRecord>, SinkError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT signature, land_slot, status FROM subscription_records WHERE signature = ?1 ORDER BY id DESC LIMIT 1",
        )?;
        let record = stmt
            .query_row(params![signature], |row| {
                let land_slot: Option<i64> = row.get(1)?;
                Ok(SubscriptionRecord {
                    signature: row.get(0)?,
                    land_slot: land_slot.map(|s| s as u64),
                    status: row.get(2)?,
                })
            })
            .optional()?;
        Ok(record)
    }

    pub async fn send_count(&self) -> Result<u64, SinkError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM send_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl LogSink for SqliteLogSink {
    async fn record_send(&self, record: &SendRecord) -> Result<(), SinkError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO send_records (signature, start_slot, endpoint, quote0_slot, quote1_slot, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.signature,
                record.start_slot as i64,
                record.endpoint,
                record.quote0_slot.map(|s| s as i64),
                record.quote1_slot.map(|s| s as i64),
                now_millis(),
            ],
        )?;
        Ok(())
    }

    async fn record_subscription(&self, record: &SubscriptionRecord) -> Result<(), SinkError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO subscription_records (signature, land_slot, status) VALUES (?1, ?2, ?3)",
            params![record.signature, record.land_slot.map(|s| s as i64), record.status],
        )?;
        Ok(())
    }

    async fn update_subscription(
        &self,
        signature: &str,
        land_slot: Option<u64>,
        status: &str,
    ) -> Result<(), SinkError> {
        let conn = self.conn.lock().await;
        match land_slot {
            Some(slot) => conn.execute(
                "UPDATE subscription_records SET land_slot = ?1, status = ?2 WHERE signature = ?3",
                params![slot as i64, status, signature],
            )?,
            None => conn.execute(
                "UPDATE subscription_records SET status = ?1 WHERE signature = ?2",
                params![status, signature],
            )?,
        };
        Ok(())
    }

    async fn last_subscription_id(&self) -> Result<u64, SinkError> {
        let conn = self.conn.lock().await;
        let max: Option<i64> =
            conn.query_row("SELECT MAX(id) FROM subscription_records", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0).max(0) as u64)
    }
}
