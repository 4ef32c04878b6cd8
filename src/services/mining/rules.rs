// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::app::config::MinerSettings;
use crate::domain::error::MinerError;
use crate::domain::types::{RuntimeContext, Strategy};
use crate::services::mining::economics;
use alloy::primitives::U256;
use async_trait::async_trait;
use chrono::Timelike;
use std::collections::HashSet;

/// Structured pass/fail of one rule, independently observable for
/// diagnostics. Presentation is layered on top by the caller.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// A named predicate over the per-cycle context. Rules are pure apart from
/// observability and never mutate the context.
#[async_trait]
pub trait MiningRule: Send + Sync {
    fn name(&self) -> &'static str;
    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome;
}

/// Unanimous-AND combinator over the configured rules.
pub struct RuleEngine {
    rules: Vec<Box<dyn MiningRule>>,
}

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub passed: bool,
    pub outcomes: Vec<RuleOutcome>,
}

impl RuleEngine {
    pub fn new(rules: Vec<Box<dyn MiningRule>>) -> Self {
        Self { rules }
    }

    /// Build the rule set once from configuration. An empty set means
    /// "always proceed".
    pub fn from_settings(settings: &MinerSettings) -> Result<Self, MinerError> {
        let probe_size = settings.max_payload_bytes;
        let mut rules: Vec<Box<dyn MiningRule>> = Vec::new();

        if let Some(max_usd) = settings.max_cost_per_token_usd {
            rules.push(Box::new(CostCapRule {
                max_cost_usd: max_usd,
                probe_size,
            }));
        }
        if let Some(min_pct) = settings.min_efficiency_pct {
            rules.push(Box::new(EfficiencyFloorRule {
                min_pct,
                probe_size,
            }));
        }
        if let Some(hours) = settings.schedule_hour_set() {
            rules.push(Box::new(ScheduleWindowRule { hours }));
        }
        if let Some(budget) = settings.daily_budget()? {
            rules.push(Box::new(BudgetCapRule { budget_wei: budget }));
        }
        if let Some(target) = settings.target_yield()? {
            rules.push(Box::new(TargetCapRule { target_raw: target }));
        }
        if settings.strategy()? == Strategy::Arbitrage {
            rules.push(Box::new(ArbitrageRule { probe_size }));
        }

        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule concurrently; rules are read-only and
    /// independent, so ordering never changes the decision.
    pub async fn evaluate(&self, ctx: &RuntimeContext) -> GateDecision {
        let outcomes =
            futures::future::join_all(self.rules.iter().map(|rule| rule.evaluate(ctx))).await;
        let passed = outcomes.iter().all(|o| o.passed);
        GateDecision { passed, outcomes }
    }
}

// ---------------------------------------------------------------------------
// Rule implementations
// ---------------------------------------------------------------------------

/// Pass iff projected cost per token at probe size, fiat-converted, is
/// within the configured ceiling.
struct CostCapRule {
    max_cost_usd: f64,
    probe_size: u64,
}

#[async_trait]
impl MiningRule for CostCapRule {
    fn name(&self) -> &'static str {
        "cost-cap"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        let projection = economics::project(
            self.probe_size,
            ctx.base_fee_wei,
            ctx.mint_rate,
            Some(ctx.gas_price_wei),
        );
        let cost_usd = economics::wei_to_usd(projection.cost_per_token_wei, ctx.fiat_rate_usd);
        RuleOutcome {
            name: self.name(),
            passed: cost_usd <= self.max_cost_usd,
            detail: format!("${cost_usd:.4}/token vs cap ${:.4}", self.max_cost_usd),
        }
    }
}

/// Pass iff projected efficiency at probe size meets the configured floor.
struct EfficiencyFloorRule {
    min_pct: f64,
    probe_size: u64,
}

#[async_trait]
impl MiningRule for EfficiencyFloorRule {
    fn name(&self) -> &'static str {
        "efficiency-floor"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        let projection = economics::project(
            self.probe_size,
            ctx.base_fee_wei,
            ctx.mint_rate,
            Some(ctx.gas_price_wei),
        );
        RuleOutcome {
            name: self.name(),
            passed: projection.efficiency_pct >= self.min_pct,
            detail: format!(
                "{:.2}% vs floor {:.2}%",
                projection.efficiency_pct, self.min_pct
            ),
        }
    }
}

/// Pass iff the context hour-of-day (UTC) is inside the allowed set.
struct ScheduleWindowRule {
    hours: HashSet<u8>,
}

#[async_trait]
impl MiningRule for ScheduleWindowRule {
    fn name(&self) -> &'static str {
        "schedule-window"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        let hour = ctx.timestamp.hour() as u8;
        RuleOutcome {
            name: self.name(),
            passed: self.hours.contains(&hour),
            detail: format!("hour {hour} UTC, {} allowed hours", self.hours.len()),
        }
    }
}

/// Pass while cumulative session spend is strictly below the daily budget;
/// spend == budget already fails.
struct BudgetCapRule {
    budget_wei: U256,
}

#[async_trait]
impl MiningRule for BudgetCapRule {
    fn name(&self) -> &'static str {
        "budget-cap"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        RuleOutcome {
            name: self.name(),
            passed: ctx.session_spent_wei < self.budget_wei,
            detail: format!(
                "spent {} of {} wei",
                ctx.session_spent_wei, self.budget_wei
            ),
        }
    }
}

/// Pass while cumulative session yield is strictly below the target;
/// reaching the target means no more mining is needed.
struct TargetCapRule {
    target_raw: U256,
}

#[async_trait]
impl MiningRule for TargetCapRule {
    fn name(&self) -> &'static str {
        "target-cap"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        RuleOutcome {
            name: self.name(),
            passed: ctx.session_minted_raw < self.target_raw,
            detail: format!(
                "minted {} of {} raw",
                ctx.session_minted_raw, self.target_raw
            ),
        }
    }
}

/// Pass iff a spot price is available and mining is strictly cheaper than
/// buying. Fails closed when the market quote is missing.
struct ArbitrageRule {
    probe_size: u64,
}

#[async_trait]
impl MiningRule for ArbitrageRule {
    fn name(&self) -> &'static str {
        "arbitrage"
    }

    async fn evaluate(&self, ctx: &RuntimeContext) -> RuleOutcome {
        let Some(spot) = ctx.spot_price_wei else {
            return RuleOutcome {
                name: self.name(),
                passed: false,
                detail: "spot price unavailable".into(),
            };
        };
        let projection = economics::project(
            self.probe_size,
            ctx.base_fee_wei,
            ctx.mint_rate,
            Some(ctx.gas_price_wei),
        );
        RuleOutcome {
            name: self.name(),
            passed: projection.cost_per_token_wei < spot,
            detail: format!(
                "mine {} vs buy {} wei/token",
                projection.cost_per_token_wei, spot
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ctx() -> RuntimeContext {
        RuntimeContext {
            base_fee_wei: 20_000_000_000,
            gas_price_wei: 25_000_000_000,
            mint_rate: 2,
            spot_price_wei: None,
            session_spent_wei: U256::ZERO,
            session_minted_raw: U256::ZERO,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 14, 30, 0).unwrap(),
            fiat_rate_usd: 3_000.0,
        }
    }

    #[tokio::test]
    async fn empty_rule_set_is_vacuously_true() {
        let engine = RuleEngine::new(Vec::new());
        let decision = engine.evaluate(&ctx()).await;
        assert!(decision.passed);
        assert!(decision.outcomes.is_empty());
    }

    #[tokio::test]
    async fn decision_equals_logical_and_of_outcomes() {
        let engine = RuleEngine::new(vec![
            Box::new(BudgetCapRule {
                budget_wei: U256::from(100u64),
            }),
            Box::new(ScheduleWindowRule {
                hours: HashSet::from([3]),
            }),
        ]);
        let decision = engine.evaluate(&ctx()).await;
        assert_eq!(
            decision.passed,
            decision.outcomes.iter().all(|o| o.passed)
        );
        // budget passes (0 < 100), schedule fails (14 not in {3})
        assert!(!decision.passed);
        assert!(decision.outcomes[0].passed);
        assert!(!decision.outcomes[1].passed);
    }

    #[tokio::test]
    async fn budget_cap_boundary_is_strict() {
        let rule = BudgetCapRule {
            budget_wei: U256::from(500u64),
        };
        let mut context = ctx();
        context.session_spent_wei = U256::from(499u64);
        assert!(rule.evaluate(&context).await.passed);
        context.session_spent_wei = U256::from(500u64);
        assert!(!rule.evaluate(&context).await.passed);
    }

    #[tokio::test]
    async fn target_cap_boundary_is_strict() {
        let rule = TargetCapRule {
            target_raw: U256::from(1_000u64),
        };
        let mut context = ctx();
        context.session_minted_raw = U256::from(999u64);
        assert!(rule.evaluate(&context).await.passed);
        context.session_minted_raw = U256::from(1_000u64);
        assert!(!rule.evaluate(&context).await.passed);
    }

    #[tokio::test]
    async fn schedule_window_matches_context_hour() {
        let rule = ScheduleWindowRule {
            hours: HashSet::from([13, 14, 15]),
        };
        assert!(rule.evaluate(&ctx()).await.passed);

        let rule = ScheduleWindowRule {
            hours: HashSet::from([0, 1]),
        };
        assert!(!rule.evaluate(&ctx()).await.passed);
    }

    #[tokio::test]
    async fn arbitrage_fails_closed_without_spot() {
        let rule = ArbitrageRule { probe_size: 25_600 };
        assert!(!rule.evaluate(&ctx()).await.passed);
    }

    #[tokio::test]
    async fn arbitrage_compares_mine_cost_to_spot() {
        let rule = ArbitrageRule { probe_size: 25_600 };
        let projection = economics::project(25_600, 20_000_000_000, 2, Some(25_000_000_000));

        let mut context = ctx();
        context.spot_price_wei = Some(projection.cost_per_token_wei + U256::from(1u64));
        assert!(rule.evaluate(&context).await.passed);

        // Equal price is not an edge: must be strictly cheaper to mine.
        context.spot_price_wei = Some(projection.cost_per_token_wei);
        assert!(!rule.evaluate(&context).await.passed);
    }

    #[tokio::test]
    async fn efficiency_floor_gates_small_probes() {
        let pass = EfficiencyFloorRule {
            min_pct: 90.0,
            probe_size: 25_600,
        };
        assert!(pass.evaluate(&ctx()).await.passed);

        let fail = EfficiencyFloorRule {
            min_pct: 90.0,
            probe_size: 600,
        };
        assert!(!fail.evaluate(&ctx()).await.passed);
    }

    #[tokio::test]
    async fn cost_cap_converts_to_fiat() {
        // mint_rate 2 halves the unit cost relative to gas price parity;
        // generous cap passes, tiny cap fails.
        let generous = CostCapRule {
            max_cost_usd: 10_000.0,
            probe_size: 25_600,
        };
        assert!(generous.evaluate(&ctx()).await.passed);

        let tight = CostCapRule {
            max_cost_usd: 0.000001,
            probe_size: 25_600,
        };
        assert!(!tight.evaluate(&ctx()).await.passed);
    }
}
