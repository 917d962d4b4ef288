mod app;
mod config;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Round-trip arbitrage executor for Solana, quoting through Jupiter")]
struct Args {
    /// Path to config file
    #[arg(long, default_value = "Config.toml")]
    config: String,

    /// RPC endpoint URL (overrides config)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Pub/sub websocket URL (overrides config)
    #[arg(long)]
    ws_url: Option<String>,

    /// Path to keypair file (overrides config)
    #[arg(long)]
    keypair: Option<String>,

    /// JSON pairs file (overrides config)
    #[arg(long)]
    pairs_file: Option<String>,

    /// Log level when RUST_LOG is not set (overrides config)
    #[arg(long)]
    log_level: Option<String>,
}

impl Args {
    /// CLI has higher priority than the config file
    fn apply(self, cfg: &mut config::Config) {
        if let Some(rpc_url) = self.rpc_url {
            cfg.rpc.url = rpc_url;
        }
        if let Some(ws_url) = self.ws_url {
            cfg.rpc.ws_url = ws_url;
        }
        if let Some(keypair) = self.keypair {
            cfg.wallet.keypair = keypair;
        }
        if let Some(pairs_file) = self.pairs_file {
            cfg.pairs.file = Some(pairs_file);
        }
        if let Some(level) = self.log_level {
            cfg.logging.level = level;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut cfg = config::Config::from_file(&args.config)?;
    args.apply(&mut cfg);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    cfg.load_pairs_file()?;
    cfg.validate()?;

    app::run(cfg).await
}
