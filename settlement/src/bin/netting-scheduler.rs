//! Netting scheduler binary
//!
//! Acts as the clearinghouse: seeds settlement accounts, then runs a
//! multilateral netting pass each time a batch window closes.
//!
//! Configuration is read from the TOML file given as the first argument or
//! in `SETTLEMENT_CONFIG`, falling back to defaults plus `SETTLEMENT_*` /
//! `LEDGER_*` environment overrides.

use anyhow::Context;
use settlement::{Config, SettlementEngine, StaticIdentity, TracingEventSink};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let config = load_config()?;
    tracing::info!(service = %config.service_name, "Starting netting scheduler");

    let identity = Arc::new(StaticIdentity::new(config.participants.clearinghouse.as_str()));
    let engine = SettlementEngine::open(config, identity, Arc::new(TracingEventSink))
        .context("failed to open settlement engine")?;

    let seeded = engine.bootstrap().context("failed to seed settlement accounts")?;
    tracing::info!(accounts = seeded.len(), "Settlement accounts ready");

    let scheduler = Arc::new(engine.scheduler());

    tokio::select! {
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for shutdown signal")?;
        }
    }

    tracing::info!("Shutting down netting scheduler");
    if let Ok(text) = engine.metrics().render() {
        tracing::debug!(metrics = %text, "Final metrics");
    }
    Ok(())
}

fn load_config() -> anyhow::Result<Config> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SETTLEMENT_CONFIG").ok());

    match path {
        Some(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path))?;
            config.apply_env()?;
            config.validate()?;
            Ok(config)
        }
        None => Ok(Config::from_env()?),
    }
}
