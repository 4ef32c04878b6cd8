// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use mitander_miner::app::config::MinerSettings;
use mitander_miner::app::logging::setup_logging;
use mitander_miner::common::metrics::spawn_metrics_server;
use mitander_miner::domain::constants::DEFAULT_LOG_LEVEL;
use mitander_miner::domain::error::MinerError;
use mitander_miner::infrastructure::data::store::SessionStore;
use mitander_miner::infrastructure::network::ledger::RpcLedgerClient;
use mitander_miner::infrastructure::network::price_feed::{FiatSource, HttpPriceFeed, QuoteSource};
use mitander_miner::infrastructure::network::provider::ConnectionFactory;
use mitander_miner::services::mining::controller::{ControllerConfig, MiningController};
use mitander_miner::services::mining::economics;
use mitander_miner::services::mining::rules::RuleEngine;
use mitander_miner::services::mining::submitter::Submitter;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about = "mitander miner")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Evaluate rules and sizing but never submit
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Metrics port (overrides config/env)
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print recorded mining history and exit
    #[arg(long, default_value_t = false)]
    stats: bool,
}

async fn print_stats(store: &SessionStore) -> Result<(), MinerError> {
    let totals = store.all_time_totals().await?;
    println!(
        "transactions: {}\nspent:  {} ETH ({} wei)\nminted: {} tokens ({} raw)",
        totals.transactions,
        economics::wei_to_eth(totals.spent_wei),
        totals.spent_wei,
        economics::wei_to_eth(totals.minted_raw),
        totals.minted_raw,
    );

    for session in store.recent_sessions(5).await? {
        println!(
            "session {} [{}] {} started {} ended {}",
            session.id,
            session.strategy,
            session.status,
            session.started_at,
            session
                .ended_at
                .map(|t| t.to_string())
                .unwrap_or_else(|| "-".into()),
        );
    }

    let recent = store.recent_transactions(10).await?;
    for record in recent {
        println!(
            "{} l1={} mint={} cost={:.6} ETH yield={:.6} eff={:.2}%",
            record.timestamp,
            record.l1_tx_hash,
            record.mint_tx_hash,
            record.cost_eth,
            record.minted_tokens,
            record.efficiency_pct,
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), MinerError> {
    let cli = Cli::parse();

    let settings = MinerSettings::load_with_path(cli.config.as_deref())?;
    setup_logging(
        if settings.debug {
            "debug"
        } else {
            DEFAULT_LOG_LEVEL
        },
        false,
    );

    let store = SessionStore::new(&settings.database_url()).await?;
    if cli.stats {
        return print_stats(&store).await;
    }

    let signer = PrivateKeySigner::from_str(&settings.wallet_key)
        .map_err(|e| MinerError::Config(format!("Invalid wallet key: {}", e)))?;
    let wallet_address = signer.address();
    let provider = ConnectionFactory::http_with_wallet(&settings.l1_rpc_url, signer)?;

    let ledger = Arc::new(RpcLedgerClient::new(
        provider,
        wallet_address,
        settings.mint_target_address,
        settings.mint_rpc_url(),
    ));
    let price_feed = Arc::new(HttpPriceFeed::new(
        settings.spot_price_url.clone(),
        settings.fiat_rate_url.clone(),
    ));

    let rules = RuleEngine::from_settings(&settings)?;
    tracing::info!(
        target: "main",
        rules = rules.len(),
        strategy = %settings.strategy()?,
        dry_run = cli.dry_run,
        wallet = %wallet_address,
        mint_target = %settings.mint_target_address,
        "Miner configured"
    );

    let submitter = Submitter::new(
        settings.retry_attempts as usize,
        settings.fee_multiplier_bps,
        settings.escalate_fees,
    );
    let config = ControllerConfig::from_settings(&settings, cli.dry_run)?;
    let controller = MiningController::new(
        config,
        rules,
        submitter,
        store,
        ledger,
        price_feed.clone() as Arc<dyn QuoteSource>,
        price_feed as Arc<dyn FiatSource>,
    );

    let metrics_port = cli.metrics_port.unwrap_or(settings.metrics_port);
    let _ = spawn_metrics_server(metrics_port, controller.stats()).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(target: "main", "Shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    controller.run(shutdown_rx).await
}
