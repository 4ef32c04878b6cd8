// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::app::config::MinerSettings;
use crate::common::error::MinerError;
use crate::domain::types::{MiningTotals, RuntimeContext, Strategy};
use crate::infrastructure::data::store::{RECOVERY_ACTIVE_SESSION, SessionStore};
use crate::infrastructure::network::ledger::LedgerClient;
use crate::infrastructure::network::price_feed::{FiatSource, QuoteSource};
use crate::services::mining::rules::RuleEngine;
use crate::services::mining::submitter::Submitter;
use crate::services::mining::{economics, sizing};
use alloy::primitives::U256;
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;

/// Cycle counters exported on the metrics endpoint.
#[derive(Debug, Default)]
pub struct MinerStats {
    pub cycles: AtomicU64,
    pub gated: AtomicU64,
    pub skipped: AtomicU64,
    pub submitted: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub strategy: Strategy,
    pub max_payload_bytes: u64,
    pub check_interval: Duration,
    pub daily_budget_wei: Option<U256>,
    pub target_yield_raw: Option<U256>,
    pub dry_run: bool,
}

impl ControllerConfig {
    pub fn from_settings(settings: &MinerSettings, dry_run: bool) -> Result<Self, MinerError> {
        Ok(Self {
            strategy: settings.strategy()?,
            max_payload_bytes: settings.max_payload_bytes,
            check_interval: settings.check_interval(),
            daily_budget_wei: settings.daily_budget()?,
            target_yield_raw: settings.target_yield()?,
            dry_run,
        })
    }
}

enum CycleOutcome {
    Gated,
    Skipped,
    Submitted,
    Failed,
}

/// Session-scoped control loop: observe conditions, gate, size, submit,
/// record. One cycle per tick, one active session at a time.
pub struct MiningController<L: LedgerClient + ?Sized> {
    config: ControllerConfig,
    rules: RuleEngine,
    submitter: Submitter,
    store: SessionStore,
    ledger: Arc<L>,
    quotes: Arc<dyn QuoteSource>,
    fiat: Arc<dyn FiatSource>,
    stats: Arc<MinerStats>,
}

impl<L: LedgerClient + ?Sized> MiningController<L> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ControllerConfig,
        rules: RuleEngine,
        submitter: Submitter,
        store: SessionStore,
        ledger: Arc<L>,
        quotes: Arc<dyn QuoteSource>,
        fiat: Arc<dyn FiatSource>,
    ) -> Self {
        Self {
            config,
            rules,
            submitter,
            store,
            ledger,
            quotes,
            fiat,
            stats: Arc::new(MinerStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<MinerStats> {
        self.stats.clone()
    }

    /// Run until shutdown or until a session cap (budget or target) is
    /// reached. The session is closed exactly once on every exit path.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MinerError> {
        let (session_id, mut totals) = self.open_session().await?;

        loop {
            if *shutdown.borrow() {
                break;
            }
            // A resumed session may already sit at its cap; never run a
            // cycle past it.
            if self.caps_reached(&totals) {
                tracing::info!(
                    target: "controller",
                    session_id,
                    spent_wei = %totals.spent_wei,
                    minted_raw = %totals.minted_raw,
                    "Session cap reached, stopping"
                );
                break;
            }

            self.stats.cycles.fetch_add(1, Ordering::Relaxed);
            match self.run_cycle(session_id, &mut totals, &mut shutdown).await {
                Ok(CycleOutcome::Gated) => {
                    self.stats.gated.fetch_add(1, Ordering::Relaxed);
                }
                Ok(CycleOutcome::Skipped) => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                }
                Ok(CycleOutcome::Submitted) => {
                    self.stats.submitted.fetch_add(1, Ordering::Relaxed);
                }
                Ok(CycleOutcome::Failed) => {
                    self.stats.failed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // Persistence errors are fatal; anything else was
                    // already absorbed inside the cycle.
                    self.store.end_session(session_id).await?;
                    return Err(e);
                }
            }

            if self.caps_reached(&totals) {
                continue;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.check_interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        self.store.end_session(session_id).await?;
        tracing::info!(
            target: "controller",
            session_id,
            transactions = totals.transactions,
            spent_eth = economics::wei_to_eth(totals.spent_wei),
            minted_tokens = economics::wei_to_eth(totals.minted_raw),
            "Session closed"
        );
        Ok(())
    }

    /// Resume the session a crash left active, otherwise start fresh.
    /// Totals are always re-aggregated from the transaction log; nothing
    /// in-memory survives a restart.
    async fn open_session(&self) -> Result<(i64, MiningTotals), MinerError> {
        if let Some(id) = self.store.find_recoverable_session().await? {
            let totals = self.store.session_totals(id).await?;
            tracing::info!(
                target: "controller",
                session_id = id,
                transactions = totals.transactions,
                spent_wei = %totals.spent_wei,
                "Resuming interrupted session"
            );
            return Ok((id, totals));
        }

        let id = self
            .store
            .create_session(&self.config.strategy.to_string())
            .await?;
        tracing::info!(
            target: "controller",
            session_id = id,
            strategy = %self.config.strategy,
            dry_run = self.config.dry_run,
            "Session started"
        );
        Ok((id, MiningTotals::default()))
    }

    async fn run_cycle(
        &self,
        session_id: i64,
        totals: &mut MiningTotals,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<CycleOutcome, MinerError> {
        let conditions = match self.ledger.get_conditions().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(target: "controller", error = %e, "Conditions unavailable, cycle abandoned");
                return Ok(CycleOutcome::Failed);
            }
        };

        let ctx = RuntimeContext {
            base_fee_wei: conditions.base_fee_wei,
            gas_price_wei: conditions.gas_price_wei,
            mint_rate: conditions.mint_rate,
            spot_price_wei: self.quotes.spot_price_wei().await,
            session_spent_wei: totals.spent_wei,
            session_minted_raw: totals.minted_raw,
            timestamp: Utc::now(),
            fiat_rate_usd: self.fiat.eth_usd_rate().await,
        };

        let decision = self.rules.evaluate(&ctx).await;
        if !decision.passed {
            for outcome in decision.outcomes.iter().filter(|o| !o.passed) {
                tracing::info!(
                    target: "controller",
                    rule = outcome.name,
                    detail = %outcome.detail,
                    "Cycle gated"
                );
            }
            return Ok(CycleOutcome::Gated);
        }

        let remaining_budget = self
            .config
            .daily_budget_wei
            .map(|budget| budget.saturating_sub(totals.spent_wei));
        let size_bytes = sizing::resolve_size(
            self.config.strategy,
            &ctx,
            self.config.max_payload_bytes,
            remaining_budget,
        );
        if size_bytes == 0 {
            tracing::debug!(target: "controller", "No viable size this cycle");
            return Ok(CycleOutcome::Skipped);
        }

        if self.config.dry_run {
            let projection = economics::project(
                size_bytes,
                ctx.base_fee_wei,
                ctx.mint_rate,
                Some(ctx.gas_price_wei),
            );
            tracing::info!(
                target: "controller",
                size_bytes,
                total_gas = projection.total_gas,
                cost_wei = %projection.cost_wei,
                minted_raw = %projection.minted_raw,
                efficiency_pct = projection.efficiency_pct,
                cost_usd = economics::wei_to_usd(projection.cost_wei, ctx.fiat_rate_usd),
                "Dry run, would mine"
            );
            return Ok(CycleOutcome::Skipped);
        }

        match self
            .submitter
            .mine_once(self.ledger.as_ref(), &conditions, size_bytes, shutdown)
            .await
        {
            Ok(result) => {
                self.store.append_transaction(session_id, &result).await?;
                // Refresh the recovery pointer so its updated_at tracks the
                // last confirmed transaction.
                self.store
                    .save_recovery_state(RECOVERY_ACTIVE_SESSION, &session_id.to_string())
                    .await?;
                totals.transactions += 1;
                totals.spent_wei = totals.spent_wei.saturating_add(result.cost_wei);
                totals.minted_raw = totals.minted_raw.saturating_add(result.minted_raw);
                Ok(CycleOutcome::Submitted)
            }
            Err(e) => {
                tracing::warn!(target: "controller", error = %e, "Cycle submission failed");
                Ok(CycleOutcome::Failed)
            }
        }
    }

    fn caps_reached(&self, totals: &MiningTotals) -> bool {
        if let Some(budget) = self.config.daily_budget_wei
            && totals.spent_wei >= budget
        {
            return true;
        }
        if let Some(target) = self.config.target_yield_raw
            && totals.minted_raw >= target
        {
            return true;
        }
        false
    }
}
