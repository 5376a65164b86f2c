mod alerts;
mod config;
mod decoder;
mod events;
mod listener;
mod logging;
mod monitor;
mod rules;

use dotenv::dotenv;
use eyre::{Result, WrapErr};
use tracing::{error, info};

use crate::config::AppConfig;
use crate::monitor::Monitor;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    let _guards = logging::init(config.as_ref().ok().and_then(|c| c.log_dir.as_deref()));

    info!("Starting AlgoUSD Event Watchdog");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e).wrap_err("failed to load configuration");
        }
    };

    info!("Configuration Loaded:");
    info!("  RPC URL: [HIDDEN]");
    info!("  Contract: {}", config.contract_address);
    info!("  Webhook: {}", config.webhook_url.host_str().unwrap_or("[unknown host]"));

    let monitor = Monitor::init(&config).await?;

    // Dropping the monitor on shutdown closes the ledger subscription.
    tokio::select! {
        result = monitor.run() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, closing ledger subscription");
            Ok(())
        }
    }
}
