// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::types::{RuntimeContext, Strategy};
use crate::services::mining::economics;
use alloy::primitives::U256;

/// Resolve the payload size for the next attempt. `0` is a first-class
/// "do not submit this cycle" signal, not an error.
///
/// With a positive remaining budget that max size would overshoot, an
/// integer binary search finds the largest size whose projected cost still
/// fits; monotonicity holds because cost is linear non-decreasing in size.
pub fn resolve_size(
    strategy: Strategy,
    ctx: &RuntimeContext,
    max_size_bytes: u64,
    remaining_budget_wei: Option<U256>,
) -> u64 {
    if let Some(budget) = remaining_budget_wei {
        if budget.is_zero() {
            return 0;
        }
        let max_cost = projected_cost(ctx, max_size_bytes);
        if max_cost > budget {
            return largest_size_within(ctx, max_size_bytes, budget);
        }
    }

    match strategy {
        Strategy::Auto => max_size_bytes,
        Strategy::Arbitrage => {
            let Some(spot) = ctx.spot_price_wei else {
                return 0;
            };
            let projection = economics::project(
                max_size_bytes,
                ctx.base_fee_wei,
                ctx.mint_rate,
                Some(ctx.gas_price_wei),
            );
            if projection.cost_per_token_wei < spot {
                max_size_bytes
            } else {
                0
            }
        }
    }
}

fn projected_cost(ctx: &RuntimeContext, size_bytes: u64) -> U256 {
    economics::project(
        size_bytes,
        ctx.base_fee_wei,
        ctx.mint_rate,
        Some(ctx.gas_price_wei),
    )
    .cost_wei
}

fn largest_size_within(ctx: &RuntimeContext, max_size_bytes: u64, budget_wei: U256) -> u64 {
    let mut lo = 1u64;
    let mut hi = max_size_bytes;
    let mut best = 0u64;
    while lo <= hi {
        let mid = lo + (hi - lo) / 2;
        if projected_cost(ctx, mid) <= budget_wei {
            best = mid;
            lo = mid + 1;
        } else if mid == 1 {
            break;
        } else {
            hi = mid - 1;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx() -> RuntimeContext {
        RuntimeContext {
            base_fee_wei: 10,
            gas_price_wei: 10,
            mint_rate: 1,
            spot_price_wei: None,
            session_spent_wei: U256::ZERO,
            session_minted_raw: U256::ZERO,
            timestamp: Utc::now(),
            fiat_rate_usd: 3_000.0,
        }
    }

    #[test]
    fn auto_without_budget_returns_max() {
        assert_eq!(resolve_size(Strategy::Auto, &ctx(), 25_600, None), 25_600);
    }

    #[test]
    fn tight_budget_shrinks_below_max() {
        let context = ctx();
        let max = 25_600u64;
        let max_cost = projected_cost(&context, max);
        let budget = max_cost / U256::from(3u8);

        let size = resolve_size(Strategy::Auto, &context, max, Some(budget));
        assert!(size > 0 && size < max);
        assert!(projected_cost(&context, size) <= budget);
        // Tightness: one more byte would no longer fit.
        assert!(projected_cost(&context, size + 1) > budget);
    }

    #[test]
    fn roomy_budget_leaves_max_untouched() {
        let context = ctx();
        let max = 4_096u64;
        let budget = projected_cost(&context, max) + U256::from(1u64);
        assert_eq!(resolve_size(Strategy::Auto, &context, max, Some(budget)), max);
    }

    #[test]
    fn budget_below_base_cost_skips_cycle() {
        // Even a 1-byte operation pays base execution gas.
        let context = ctx();
        assert_eq!(
            resolve_size(Strategy::Auto, &context, 25_600, Some(U256::from(1u64))),
            0
        );
        assert_eq!(
            resolve_size(Strategy::Auto, &context, 25_600, Some(U256::ZERO)),
            0
        );
    }

    #[test]
    fn arbitrage_without_spot_always_skips() {
        let context = ctx();
        for max in [1u64, 512, 25_600, 102_400] {
            assert_eq!(resolve_size(Strategy::Arbitrage, &context, max, None), 0);
        }
    }

    #[test]
    fn arbitrage_mines_only_when_cheaper() {
        let mut context = ctx();
        let max = 25_600u64;
        let unit_cost = economics::project(
            max,
            context.base_fee_wei,
            context.mint_rate,
            Some(context.gas_price_wei),
        )
        .cost_per_token_wei;

        context.spot_price_wei = Some(unit_cost + U256::from(1u64));
        assert_eq!(resolve_size(Strategy::Arbitrage, &context, max, None), max);

        context.spot_price_wei = Some(unit_cost);
        assert_eq!(resolve_size(Strategy::Arbitrage, &context, max, None), 0);
    }
}
