// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::MinerError;
use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Mining strategy tag, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Mine at max size whenever the configured rules pass.
    Auto,
    /// Mine only while minting is cheaper than buying on the market.
    Arbitrage,
}

impl FromStr for Strategy {
    type Err = MinerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Strategy::Auto),
            "arbitrage" => Ok(Strategy::Arbitrage),
            other => Err(MinerError::Validation {
                field: "strategy".into(),
                message: format!("unknown strategy '{other}' (expected auto|arbitrage)"),
            }),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Auto => write!(f, "auto"),
            Strategy::Arbitrage => write!(f, "arbitrage"),
        }
    }
}

/// Immutable per-cycle snapshot of network and session conditions.
///
/// All monetary fields are integers in wei / raw token units; the fiat rate
/// is the only float and is advisory display input, never settlement math.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub base_fee_wei: u128,
    pub gas_price_wei: u128,
    pub mint_rate: u128,
    /// Market price of one whole yield token, in wei. None when unavailable.
    pub spot_price_wei: Option<U256>,
    pub session_spent_wei: U256,
    pub session_minted_raw: U256,
    pub timestamp: DateTime<Utc>,
    pub fiat_rate_usd: f64,
}

/// Network-side slice of [`RuntimeContext`], as reported by the ledger.
#[derive(Debug, Clone)]
pub struct NetworkConditions {
    pub base_fee_wei: u128,
    pub gas_price_wei: u128,
    pub mint_rate: u128,
    pub timestamp: DateTime<Utc>,
}

/// Fee assignment for one submission attempt.
#[derive(Debug, Clone, Copy)]
pub struct FeeParams {
    pub max_fee_per_gas_wei: u128,
    pub max_priority_fee_per_gas_wei: u128,
}

/// Outcome of one confirmed mining submission. Produced only on success.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    pub l1_tx_hash: String,
    pub mint_tx_hash: String,
    pub cost_wei: U256,
    pub minted_raw: U256,
    pub efficiency_pct: f64,
    pub gas_used: u64,
    pub effective_gas_price_wei: u128,
    pub base_fee_at_inclusion_wei: u128,
}

/// Aggregated totals for a session or for all recorded history.
#[derive(Debug, Clone, Default)]
pub struct MiningTotals {
    pub transactions: u64,
    pub spent_wei: U256,
    pub minted_raw: U256,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_case_insensitive() {
        assert_eq!("Auto".parse::<Strategy>().unwrap(), Strategy::Auto);
        assert_eq!(
            " arbitrage ".parse::<Strategy>().unwrap(),
            Strategy::Arbitrage
        );
        assert!("yolo".parse::<Strategy>().is_err());
    }
}
