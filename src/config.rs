use anyhow::{bail, Context, Result};
use serde::Deserialize;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use std::str::FromStr;
use std::time::Duration;
use std::{fs, path::Path};

use jup_arb::application::{EngineSettings, RefreshIntervals};
use jup_arb::domain::arbitrage::{DecisionConfig, FilterConfig, TierCeilings, TierThresholds};
use jup_arb::infrastructure::subscription::{BookSettings, TrackerSettings};
use jup_arb::shared::types::{DeliveryMode, TradePair, WSOL_MINT};
use jup_arb::shared::utils::RetryPolicy;

const DEFAULT_WS_URL: &str = "wss://api.mainnet-beta.solana.com";

#[derive(Debug, Clone, Deserialize)]
pub struct RpcCfg {
    pub url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Direct send nodes; empty means `url`
    #[serde(default)]
    pub send_urls: Vec<String>,
    /// Fee oracle endpoint; defaults to `url`
    #[serde(default)]
    pub priority_fee_url: Option<String>,
    #[serde(default = "default_commitment")]
    pub commitment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletCfg {
    pub keypair: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JupiterCfg {
    pub api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairCfg {
    pub symbol: String,
    pub mint: String,
}

impl From<PairCfg> for TradePair {
    fn from(p: PairCfg) -> Self {
        TradePair::new(p.symbol, p.mint)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PairsCfg {
    pub base: PairCfg,
    pub quotes: Vec<PairCfg>,
    /// JSON file with `pair1` and `pair2s`; overrides the inline lists
    pub file: Option<String>,
}

impl Default for PairsCfg {
    fn default() -> Self {
        Self {
            base: PairCfg {
                symbol: "wsol".to_string(),
                mint: WSOL_MINT.to_string(),
            },
            quotes: Vec::new(),
            file: None,
        }
    }
}

/// Layout of the generated pairs file
#[derive(Debug, Clone, Deserialize)]
struct PairsFile {
    pair1: PairCfg,
    pair2s: Vec<PairCfg>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradeCfg {
    pub trade_percentage_of_balance: f64,
    pub min_profit_bps: i64,
    pub min_tip_lamports: u64,
    pub tip_fee_percentage: f64,
    pub compute_unit_limit: u32,
    pub direct_route: bool,
    pub max_accounts: u8,
    pub round_interval_ms: u64,
    /// Blockhash window size, one signed copy per entry
    pub tx_multiplier: usize,
    pub max_lookup_tables: usize,
}

impl Default for TradeCfg {
    fn default() -> Self {
        Self {
            trade_percentage_of_balance: 0.1,
            min_profit_bps: -5000,
            min_tip_lamports: 100_000,
            tip_fee_percentage: 0.0,
            compute_unit_limit: 199_999,
            direct_route: true,
            max_accounts: 28,
            round_interval_ms: 350,
            tx_multiplier: 1,
            max_lookup_tables: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PriorityFeeCfg {
    #[serde(flatten)]
    pub thresholds: TierThresholds,
    #[serde(flatten)]
    pub ceilings: TierCeilings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryCfg {
    pub send_by_bundle: bool,
    pub send_to_both: bool,
    pub relay_urls: Vec<String>,
    pub tip_accounts: Vec<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for DeliveryCfg {
    fn default() -> Self {
        Self {
            send_by_bundle: true,
            send_to_both: true,
            relay_urls: [
                "https://amsterdam.mainnet.block-engine.jito.wtf",
                "https://frankfurt.mainnet.block-engine.jito.wtf",
                "https://ny.mainnet.block-engine.jito.wtf",
                "https://tokyo.mainnet.block-engine.jito.wtf",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            tip_accounts: [
                "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
                "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
                "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
                "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
                "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
                "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
                "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
                "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            retry_attempts: 3,
            retry_delay_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SubscriptionCfg {
    pub commitment: String,
    pub enable_received_notification: bool,
    pub max_signature_secs: u64,
    pub max_account_secs: u64,
    pub ping_interval_secs: u64,
    pub sweep_interval_secs: u64,
    pub reconnect_delay_secs: u64,
    pub drop_tag_threshold: u32,
}

impl Default for SubscriptionCfg {
    fn default() -> Self {
        Self {
            commitment: default_commitment(),
            enable_received_notification: false,
            max_signature_secs: 60,
            max_account_secs: 86_400,
            ping_interval_secs: 20,
            sweep_interval_secs: 60,
            reconnect_delay_secs: 5,
            drop_tag_threshold: 2,
        }
    }
}

/// Refresh periods in milliseconds
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IntervalsCfg {
    pub balance: u64,
    pub blockhash: u64,
    pub slot_fetch: u64,
    pub slot_tick: u64,
    pub priority_fee: u64,
}

impl Default for IntervalsCfg {
    fn default() -> Self {
        Self {
            balance: 300_000,
            blockhash: 10_000,
            slot_fetch: 10_000,
            slot_tick: 420,
            priority_fee: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSinkCfg {
    /// SQLite file; in-memory when absent
    pub path: Option<String>,
    pub reset_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingCfg {
    pub level: String,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub rpc: RpcCfg,
    pub wallet: WalletCfg,
    pub jupiter: JupiterCfg,
    #[serde(default)]
    pub pairs: PairsCfg,
    #[serde(default)]
    pub trade: TradeCfg,
    #[serde(default)]
    pub filters: FilterConfig,
    #[serde(default)]
    pub priority_fee: PriorityFeeCfg,
    #[serde(default)]
    pub delivery: DeliveryCfg,
    #[serde(default)]
    pub subscription: SubscriptionCfg,
    #[serde(default)]
    pub intervals: IntervalsCfg,
    #[serde(default)]
    pub log_sink: LogSinkCfg,
    #[serde(default)]
    pub logging: LoggingCfg,
}

fn default_ws_url() -> String {
    DEFAULT_WS_URL.to_string()
}

fn default_commitment() -> String {
    "confirmed".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse Config.toml")?;
        Ok(cfg)
    }

    /// Replace the inline pair lists with the pairs file, when one is set
    pub fn load_pairs_file(&mut self) -> Result<()> {
        let Some(path) = self.pairs.file.clone() else {
            return Ok(());
        };
        let raw = fs::read_to_string(&path).with_context(|| format!("read pairs file {}", path))?;
        let file: PairsFile = serde_json::from_str(&raw).with_context(|| format!("parse pairs file {}", path))?;
        self.pairs.base = file.pair1;
        self.pairs.quotes = file.pair2s;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.quotes.is_empty() {
            bail!("no quote pairs configured");
        }
        let mode = self.delivery_mode();
        if mode.uses_relays() && self.delivery.relay_urls.is_empty() {
            bail!("relay delivery enabled but no relay_urls configured");
        }
        if mode.uses_relays() && self.delivery.tip_accounts.is_empty() {
            bail!("relay delivery enabled but no tip_accounts configured");
        }
        if !(0.0..=1.0).contains(&self.trade.trade_percentage_of_balance) {
            bail!(
                "trade_percentage_of_balance must be within [0, 1], got {}",
                self.trade.trade_percentage_of_balance
            );
        }
        Ok(())
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        DeliveryMode::from_flags(self.delivery.send_to_both, self.delivery.send_by_bundle)
    }

    pub fn commitment(&self) -> Result<CommitmentConfig> {
        let level = CommitmentLevel::from_str(&self.rpc.commitment)
            .map_err(|e| anyhow::anyhow!("invalid commitment {}: {}", self.rpc.commitment, e))?;
        Ok(CommitmentConfig { commitment: level })
    }

    pub fn send_urls(&self) -> Vec<String> {
        if self.rpc.send_urls.is_empty() {
            vec![self.rpc.url.clone()]
        } else {
            self.rpc.send_urls.clone()
        }
    }

    pub fn priority_fee_url(&self) -> String {
        self.rpc.priority_fee_url.clone().unwrap_or_else(|| self.rpc.url.clone())
    }

    pub fn decision(&self) -> DecisionConfig {
        DecisionConfig {
            filters: self.filters.clone(),
            min_profit_ratio: self.trade.min_profit_bps as f64 / 10_000.0,
            min_tip_lamports: self.trade.min_tip_lamports,
            tip_fee_percentage: self.trade.tip_fee_percentage,
            thresholds: self.priority_fee.thresholds,
            ceilings: self.priority_fee.ceilings,
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            base: self.pairs.base.clone().into(),
            quotes: self.pairs.quotes.iter().cloned().map(TradePair::from).collect(),
            trade_fraction: self.trade.trade_percentage_of_balance,
            direct_route: self.trade.direct_route,
            max_accounts: Some(self.trade.max_accounts),
            round_interval: Duration::from_millis(self.trade.round_interval_ms),
            decision: self.decision(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.delivery.retry_attempts,
            Duration::from_millis(self.delivery.retry_delay_ms),
        )
    }

    pub fn refresh_intervals(&self) -> RefreshIntervals {
        let i = &self.intervals;
        RefreshIntervals {
            balance: Duration::from_millis(i.balance),
            blockhash: Duration::from_millis(i.blockhash),
            slot_fetch: Duration::from_millis(i.slot_fetch),
            slot_tick: Duration::from_millis(i.slot_tick),
            priority_fee: Duration::from_millis(i.priority_fee),
        }
    }

    pub fn book_settings(&self) -> BookSettings {
        let s = &self.subscription;
        BookSettings {
            commitment: s.commitment.clone(),
            enable_received_notification: s.enable_received_notification,
            max_signature_duration: Duration::from_secs(s.max_signature_secs),
            max_account_duration: Duration::from_secs(s.max_account_secs),
            drop_tag_threshold: s.drop_tag_threshold,
        }
    }

    pub fn tracker_settings(&self) -> TrackerSettings {
        let s = &self.subscription;
        TrackerSettings {
            ws_url: self.rpc.ws_url.clone(),
            ping_interval: Duration::from_secs(s.ping_interval_secs),
            sweep_interval: Duration::from_secs(s.sweep_interval_secs),
            reconnect_delay: Duration::from_secs(s.reconnect_delay_secs),
        }
    }
}
