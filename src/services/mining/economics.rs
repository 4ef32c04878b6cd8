// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants::{BASE_TX_GAS, NONZERO_BYTE_GAS, TX_OVERHEAD_BYTES, WEI_PER_ETH};
use alloy::primitives::U256;

/// Projected economics of a mining transaction of a given byte size.
///
/// All payload bytes are the repeating non-zero pattern, so every byte past
/// the envelope overhead is charged at the non-zero calldata rate. Yield is
/// always minted from the base fee; the (possibly inflated) submission gas
/// price affects only the cost side.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningProjection {
    pub size_bytes: u64,
    pub payload_bytes: u64,
    pub variable_gas: u64,
    pub total_gas: u64,
    pub minted_raw: U256,
    pub cost_wei: U256,
    pub efficiency_pct: f64,
    /// Wei per whole token, 18-decimal fixed point. Zero when nothing mints.
    pub cost_per_token_wei: U256,
}

/// Economics recomputed from confirmed receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct ActualEconomics {
    pub cost_wei: U256,
    pub efficiency_pct: f64,
    pub cost_per_token_wei: U256,
}

/// Deterministic, side-effect-free projection used both before submission
/// and by the rule engine and size optimizer. `gas_price_wei` defaults to
/// the base fee when absent.
pub fn project(
    size_bytes: u64,
    base_fee_wei: u128,
    mint_rate: u128,
    gas_price_wei: Option<u128>,
) -> MiningProjection {
    let payload_bytes = size_bytes.saturating_sub(TX_OVERHEAD_BYTES);
    let variable_gas = payload_bytes.saturating_mul(NONZERO_BYTE_GAS);
    let total_gas = variable_gas.saturating_add(BASE_TX_GAS);

    let minted_raw = U256::from(variable_gas)
        .saturating_mul(U256::from(base_fee_wei))
        .saturating_mul(U256::from(mint_rate));

    let effective_price = gas_price_wei.unwrap_or(base_fee_wei);
    let cost_wei = U256::from(total_gas).saturating_mul(U256::from(effective_price));

    MiningProjection {
        size_bytes,
        payload_bytes,
        variable_gas,
        total_gas,
        minted_raw,
        cost_wei,
        efficiency_pct: efficiency_pct(variable_gas, total_gas),
        cost_per_token_wei: cost_per_token(cost_wei, minted_raw),
    }
}

/// Reconciliation after confirmation: same math, fed with the gas actually
/// consumed, the price actually paid and the yield actually minted.
pub fn reconcile(
    gas_used: u64,
    effective_gas_price_wei: u128,
    minted_raw: U256,
) -> ActualEconomics {
    let cost_wei = U256::from(gas_used).saturating_mul(U256::from(effective_gas_price_wei));
    let variable_gas = gas_used.saturating_sub(BASE_TX_GAS);

    ActualEconomics {
        cost_wei,
        efficiency_pct: efficiency_pct(variable_gas, gas_used),
        cost_per_token_wei: cost_per_token(cost_wei, minted_raw),
    }
}

fn efficiency_pct(variable_gas: u64, total_gas: u64) -> f64 {
    if total_gas == 0 {
        return 0.0;
    }
    variable_gas as f64 / total_gas as f64 * 100.0
}

fn cost_per_token(cost_wei: U256, minted_raw: U256) -> U256 {
    if minted_raw.is_zero() {
        // Guard, not an exception: no yield means no meaningful unit cost.
        return U256::ZERO;
    }
    cost_wei
        .saturating_mul(U256::from(WEI_PER_ETH))
        .checked_div(minted_raw)
        .unwrap_or(U256::ZERO)
}

/// Advisory fiat conversion of an 18-decimal fixed-point wei amount.
/// Display math only; never feeds back into settlement values.
pub fn wei_to_usd(amount_wei: U256, eth_usd_rate: f64) -> f64 {
    wei_to_eth(amount_wei) * eth_usd_rate
}

/// Lossy decimal view of a wei amount, for logging and stored display columns.
pub fn wei_to_eth(amount_wei: U256) -> f64 {
    let whole: f64 = amount_wei.to_string().parse().unwrap_or(f64::MAX);
    whole / WEI_PER_ETH as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_matches_reference_scenario() {
        // 25600 bytes at overhead 160 / rate 40: 25440 * 40 = 1,017,600
        // variable gas, 1,038,600 total, ~97.98% efficiency.
        let p = project(25_600, 10, 1, None);
        assert_eq!(p.payload_bytes, 25_440);
        assert_eq!(p.variable_gas, 1_017_600);
        assert_eq!(p.total_gas, 1_038_600);
        assert!((p.efficiency_pct - 97.9780).abs() < 0.001);
    }

    #[test]
    fn cost_and_yield_are_monotone_in_size() {
        let mut last = project(1, 50, 3, Some(80));
        for size in [200, 1_000, 4_096, 25_600, 102_400] {
            let next = project(size, 50, 3, Some(80));
            assert!(next.cost_wei >= last.cost_wei);
            assert!(next.minted_raw >= last.minted_raw);
            last = next;
        }
    }

    #[test]
    fn undersized_payload_mints_nothing() {
        let p = project(100, 25, 2, None);
        assert_eq!(p.payload_bytes, 0);
        assert_eq!(p.variable_gas, 0);
        assert_eq!(p.total_gas, BASE_TX_GAS);
        assert_eq!(p.minted_raw, U256::ZERO);
        // Division-by-zero guard: zero yield means zero unit cost.
        assert_eq!(p.cost_per_token_wei, U256::ZERO);
        assert!(p.cost_wei > U256::ZERO);
    }

    #[test]
    fn cost_per_token_zero_iff_no_yield() {
        for size in [0, 159, 160, 161, 10_000] {
            let p = project(size, 30, 5, None);
            assert_eq!(p.cost_per_token_wei.is_zero(), p.minted_raw.is_zero());
        }
    }

    #[test]
    fn gas_price_defaults_to_base_fee() {
        let defaulted = project(2_000, 42, 1, None);
        let explicit = project(2_000, 42, 1, Some(42));
        assert_eq!(defaulted, explicit);
    }

    #[test]
    fn yield_ignores_inflated_gas_price() {
        let cheap = project(2_000, 42, 1, Some(42));
        let boosted = project(2_000, 42, 1, Some(84));
        assert_eq!(cheap.minted_raw, boosted.minted_raw);
        assert_eq!(boosted.cost_wei, cheap.cost_wei * U256::from(2u8));
    }

    #[test]
    fn reconcile_uses_actual_values() {
        let actual = reconcile(1_038_600, 63, U256::from(1_000_000u64));
        assert_eq!(
            actual.cost_wei,
            U256::from(1_038_600u64) * U256::from(63u64)
        );
        assert!((actual.efficiency_pct - 97.9780).abs() < 0.001);
        assert!(actual.cost_per_token_wei > U256::ZERO);
    }

    #[test]
    fn reconcile_guards_zero_yield() {
        let actual = reconcile(BASE_TX_GAS, 10, U256::ZERO);
        assert_eq!(actual.efficiency_pct, 0.0);
        assert_eq!(actual.cost_per_token_wei, U256::ZERO);
    }
}
