// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::MinerError;
use crate::domain::constants::{
    CONFIRMATION_TIMEOUT_SECS, DEFAULT_PRIORITY_FEE_GWEI, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS,
    MINE_PAYLOAD_BYTE,
};
use crate::domain::types::{FeeParams, NetworkConditions, SubmissionResult};
use crate::infrastructure::network::ledger::LedgerClient;
use crate::services::mining::economics;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

/// Where a submission attempt currently stands. Logged on every transition;
/// a cycle either reaches `Completed` or dies in `Failed` after the retry
/// budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Preparing,
    Submitting,
    AwaitingOuterConfirmation,
    AwaitingInnerConfirmation,
    Reconciling,
    Completed,
    Failed,
}

impl fmt::Display for SubmissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Preparing => "preparing",
            Self::Submitting => "submitting",
            Self::AwaitingOuterConfirmation => "awaiting_outer_confirmation",
            Self::AwaitingInnerConfirmation => "awaiting_inner_confirmation",
            Self::Reconciling => "reconciling",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

pub struct Submitter {
    retry_attempts: usize,
    fee_multiplier_bps: u64,
    escalate_fees: bool,
}

impl Submitter {
    pub fn new(retry_attempts: usize, fee_multiplier_bps: u64, escalate_fees: bool) -> Self {
        Self {
            retry_attempts: retry_attempts.max(1),
            fee_multiplier_bps,
            escalate_fees,
        }
    }

    /// Fee cap for a given attempt. Attempt zero pads the observed gas price
    /// by the configured multiplier; later attempts with escalation enabled
    /// bump the tip linearly so a replacement outbids the stuck original.
    pub fn fee_for_attempt(&self, conditions: &NetworkConditions, attempt: usize) -> FeeParams {
        let base_fee = conditions.base_fee_wei;
        if attempt == 0 || !self.escalate_fees {
            let max_fee = conditions
                .gas_price_wei
                .saturating_mul(self.fee_multiplier_bps as u128)
                / 10_000;
            return FeeParams {
                max_fee_per_gas_wei: max_fee,
                max_priority_fee_per_gas_wei: max_fee.saturating_sub(base_fee),
            };
        }

        let floor_tip = u128::from(DEFAULT_PRIORITY_FEE_GWEI) * 1_000_000_000;
        let base_tip = conditions
            .gas_price_wei
            .saturating_sub(base_fee)
            .max(floor_tip);
        let tip = base_tip.saturating_mul(1 + attempt as u128);
        FeeParams {
            max_fee_per_gas_wei: base_fee.saturating_add(tip),
            max_priority_fee_per_gas_wei: tip,
        }
    }

    /// Run one mining transaction to completion: submit, wait out both
    /// confirmation layers, reconcile against real receipts. Retries the
    /// whole sequence on failure with doubling backoff; a shutdown signal
    /// aborts between attempts, never mid-confirmation.
    pub async fn mine_once<L: LedgerClient + ?Sized>(
        &self,
        ledger: &L,
        conditions: &NetworkConditions,
        size_bytes: u64,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SubmissionResult, MinerError> {
        let payload = vec![MINE_PAYLOAD_BYTE; size_bytes as usize];
        let timeout = Duration::from_secs(CONFIRMATION_TIMEOUT_SECS);
        let mut last_error = None;

        for attempt in 0..self.retry_attempts {
            if *shutdown.borrow() {
                return Err(MinerError::Submission {
                    hash: String::new(),
                    reason: "shutdown requested".into(),
                });
            }

            let fee = self.fee_for_attempt(conditions, attempt);
            tracing::debug!(
                target: "submitter",
                attempt,
                phase = %SubmissionPhase::Submitting,
                max_fee = fee.max_fee_per_gas_wei,
                tip = fee.max_priority_fee_per_gas_wei,
                size_bytes,
                "Submitting mine transaction"
            );

            match self.attempt_once(ledger, &payload, fee, timeout).await {
                Ok(result) => {
                    tracing::info!(
                        target: "submitter",
                        phase = %SubmissionPhase::Completed,
                        l1_tx = %result.l1_tx_hash,
                        mint_tx = %result.mint_tx_hash,
                        cost_wei = %result.cost_wei,
                        efficiency_pct = result.efficiency_pct,
                        "Mine transaction confirmed"
                    );
                    return Ok(result);
                }
                Err(e) => {
                    tracing::warn!(
                        target: "submitter",
                        attempt,
                        error = %e,
                        "Mine attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            // No backoff after the final attempt.
            if attempt + 1 < self.retry_attempts {
                let delay = Duration::from_millis(
                    INITIAL_BACKOFF_MS
                        .saturating_mul(1 << attempt.min(20))
                        .min(MAX_BACKOFF_MS),
                );
                tokio::select! {
                    _ = sleep(delay) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return Err(MinerError::Submission {
                                hash: String::new(),
                                reason: "shutdown requested".into(),
                            });
                        }
                    }
                }
            }
        }

        tracing::error!(
            target: "submitter",
            phase = %SubmissionPhase::Failed,
            attempts = self.retry_attempts,
            "Mine transaction exhausted retry budget"
        );
        Err(last_error.unwrap_or_else(|| MinerError::Submission {
            hash: String::new(),
            reason: "no attempts executed".into(),
        }))
    }

    async fn attempt_once<L: LedgerClient + ?Sized>(
        &self,
        ledger: &L,
        payload: &[u8],
        fee: FeeParams,
        timeout: Duration,
    ) -> Result<SubmissionResult, MinerError> {
        let (l1_tx_hash, mint_tx_hash) = ledger.submit(payload, fee).await?;

        tracing::debug!(
            target: "submitter",
            phase = %SubmissionPhase::AwaitingOuterConfirmation,
            l1_tx = %l1_tx_hash,
        );
        let outer = ledger.await_outer_confirmation(&l1_tx_hash, timeout).await?;

        tracing::debug!(
            target: "submitter",
            phase = %SubmissionPhase::AwaitingInnerConfirmation,
            mint_tx = %mint_tx_hash,
        );
        ledger.await_mint_confirmation(&mint_tx_hash, timeout).await?;

        tracing::debug!(target: "submitter", phase = %SubmissionPhase::Reconciling);
        let mint = ledger.get_mint_transaction(&mint_tx_hash).await?;
        let actual = economics::reconcile(
            outer.gas_used,
            outer.effective_gas_price_wei,
            mint.minted_raw,
        );

        Ok(SubmissionResult {
            l1_tx_hash,
            mint_tx_hash,
            cost_wei: actual.cost_wei,
            minted_raw: mint.minted_raw,
            efficiency_pct: actual.efficiency_pct,
            gas_used: outer.gas_used,
            effective_gas_price_wei: outer.effective_gas_price_wei,
            base_fee_at_inclusion_wei: outer.base_fee_wei,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::ledger::{MintReceipt, OuterReceipt};
    use alloy::primitives::U256;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct ScriptedLedger {
        submit_failures: Mutex<usize>,
        submit_calls: Mutex<usize>,
        fees_seen: Mutex<Vec<FeeParams>>,
    }

    impl ScriptedLedger {
        fn failing(times: usize) -> Self {
            Self {
                submit_failures: Mutex::new(times),
                submit_calls: Mutex::new(0),
                fees_seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            *self.submit_calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LedgerClient for ScriptedLedger {
        async fn submit(
            &self,
            _payload: &[u8],
            fee: FeeParams,
        ) -> Result<(String, String), MinerError> {
            *self.submit_calls.lock().unwrap() += 1;
            self.fees_seen.lock().unwrap().push(fee);
            let mut remaining = self.submit_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MinerError::Submission {
                    hash: String::new(),
                    reason: "nonce too low".into(),
                });
            }
            Ok(("0xouter".into(), "0xmint".into()))
        }

        async fn await_outer_confirmation(
            &self,
            _l1_tx_hash: &str,
            _timeout: Duration,
        ) -> Result<OuterReceipt, MinerError> {
            Ok(OuterReceipt {
                gas_used: 1_038_600,
                effective_gas_price_wei: 63,
                base_fee_wei: 60,
            })
        }

        async fn await_mint_confirmation(
            &self,
            _mint_tx_hash: &str,
            _timeout: Duration,
        ) -> Result<(), MinerError> {
            Ok(())
        }

        async fn get_mint_transaction(
            &self,
            _mint_tx_hash: &str,
        ) -> Result<MintReceipt, MinerError> {
            Ok(MintReceipt {
                minted_raw: U256::from(1_000_000u64),
            })
        }

        async fn get_conditions(&self) -> Result<NetworkConditions, MinerError> {
            Ok(conditions())
        }
    }

    fn conditions() -> NetworkConditions {
        NetworkConditions {
            base_fee_wei: 60,
            gas_price_wei: 63,
            mint_rate: 1,
            timestamp: Utc::now(),
        }
    }

    fn shutdown_rx() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Held open for the test lifetime.
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn success_path_reconciles_with_receipts() {
        let ledger = ScriptedLedger::failing(0);
        let submitter = Submitter::new(3, 15_000, false);
        let mut shutdown = shutdown_rx();

        let result = submitter
            .mine_once(&ledger, &conditions(), 25_600, &mut shutdown)
            .await
            .unwrap();

        assert_eq!(ledger.calls(), 1);
        assert_eq!(result.gas_used, 1_038_600);
        assert_eq!(result.cost_wei, U256::from(1_038_600u64) * U256::from(63u64));
        assert!((result.efficiency_pct - 97.9780).abs() < 0.001);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_budget_is_respected() {
        let ledger = ScriptedLedger::failing(10);
        let submitter = Submitter::new(3, 15_000, false);
        let mut shutdown = shutdown_rx();

        let start = tokio::time::Instant::now();
        let err = submitter
            .mine_once(&ledger, &conditions(), 512, &mut shutdown)
            .await
            .unwrap_err();

        assert_eq!(ledger.calls(), 3);
        assert!(matches!(err, MinerError::Submission { .. }));
        // Two backoffs: 1000ms then 2000ms, none after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(3_000));
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_raises_fee_caps_per_attempt() {
        let ledger = ScriptedLedger::failing(2);
        let submitter = Submitter::new(3, 15_000, true);
        let mut shutdown = shutdown_rx();

        submitter
            .mine_once(&ledger, &conditions(), 512, &mut shutdown)
            .await
            .unwrap();

        let fees = ledger.fees_seen.lock().unwrap().clone();
        assert_eq!(fees.len(), 3);
        assert!(fees[1].max_fee_per_gas_wei > fees[0].max_fee_per_gas_wei);
        assert!(fees[2].max_fee_per_gas_wei > fees[1].max_fee_per_gas_wei);
        assert!(fees[2].max_priority_fee_per_gas_wei > fees[1].max_priority_fee_per_gas_wei);
    }

    #[tokio::test]
    async fn escalated_tip_floors_at_two_gwei() {
        // Observed tip of 3 wei is far below the floor; the replacement
        // attempt must still carry a meaningful tip.
        let submitter = Submitter::new(3, 15_000, true);
        let tight = NetworkConditions {
            base_fee_wei: 100,
            gas_price_wei: 103,
            mint_rate: 1,
            timestamp: Utc::now(),
        };
        let fee = submitter.fee_for_attempt(&tight, 1);
        assert_eq!(fee.max_priority_fee_per_gas_wei, 2 * 2_000_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_backoff() {
        let ledger = ScriptedLedger::failing(10);
        let submitter = Submitter::new(3, 15_000, false);
        let (tx, mut shutdown) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });

        let start = tokio::time::Instant::now();
        let err = submitter
            .mine_once(&ledger, &conditions(), 512, &mut shutdown)
            .await
            .unwrap_err();

        assert_eq!(ledger.calls(), 1);
        assert!(matches!(err, MinerError::Submission { .. }));
        assert!(start.elapsed() < Duration::from_millis(1_000));
    }
}
