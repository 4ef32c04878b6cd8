// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::constants::{
    DEFAULT_FEE_MULTIPLIER_BPS, DEFAULT_RETRY_ATTEMPTS, MAX_PAYLOAD_BYTES,
};
use crate::domain::error::MinerError;
use crate::domain::types::Strategy;
use alloy::primitives::{Address, U256};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct MinerSettings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    pub database_url: Option<String>,

    // Identity
    pub wallet_key: String,

    // Endpoints
    pub l1_rpc_url: String,
    /// Derivation-layer node; falls back to the L1 endpoint when absent.
    pub mint_rpc_url: Option<String>,
    pub mint_target_address: Address,
    pub spot_price_url: Option<String>,
    pub fiat_rate_url: Option<String>,

    // Mining policy
    #[serde(default = "default_strategy")]
    pub strategy: String,
    pub max_cost_per_token_usd: Option<f64>,
    pub min_efficiency_pct: Option<f64>,
    /// Hours of day (UTC, 0-23) in which mining is allowed.
    pub schedule_hours: Option<Vec<u8>>,
    /// Decimal wei string; session spend cap.
    pub daily_budget_wei: Option<String>,
    /// Decimal raw-unit string; stop once this much yield is minted.
    pub target_yield_raw: Option<String>,
    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: u64,

    // Submission
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_fee_multiplier_bps")]
    pub fee_multiplier_bps: u64,
    #[serde(default = "default_false")]
    pub escalate_fees: bool,

    // Observability
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_false() -> bool {
    false
}
fn default_strategy() -> String {
    "auto".to_string()
}
fn default_check_interval_secs() -> u64 {
    60
}
fn default_max_payload_bytes() -> u64 {
    MAX_PAYLOAD_BYTES
}
fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}
fn default_fee_multiplier_bps() -> u64 {
    DEFAULT_FEE_MULTIPLIER_BPS
}
fn default_metrics_port() -> u16 {
    9000
}

impl MinerSettings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, MinerError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: MinerSettings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, MinerError> {
        Self::load_with_path(None)
    }

    /// Reject invalid values before the control loop starts; configuration
    /// errors are never absorbed at runtime.
    pub fn validate(&self) -> Result<(), MinerError> {
        if self.wallet_key.trim().is_empty() {
            return Err(MinerError::Config("WALLET_KEY is missing".to_string()));
        }
        self.strategy()?;
        self.daily_budget()?;
        self.target_yield()?;

        if let Some(pct) = self.min_efficiency_pct
            && !(0.0..=100.0).contains(&pct)
        {
            return Err(MinerError::Validation {
                field: "min_efficiency_pct".into(),
                message: format!("{pct} outside 0-100"),
            });
        }
        if let Some(hours) = &self.schedule_hours {
            if hours.is_empty() {
                return Err(MinerError::Validation {
                    field: "schedule_hours".into(),
                    message: "empty hour set would gate every cycle".into(),
                });
            }
            if let Some(bad) = hours.iter().find(|h| **h > 23) {
                return Err(MinerError::Validation {
                    field: "schedule_hours".into(),
                    message: format!("hour {bad} outside 0-23"),
                });
            }
        }
        if self.max_payload_bytes == 0 || self.max_payload_bytes > MAX_PAYLOAD_BYTES {
            return Err(MinerError::Validation {
                field: "max_payload_bytes".into(),
                message: format!(
                    "{} outside 1-{}",
                    self.max_payload_bytes, MAX_PAYLOAD_BYTES
                ),
            });
        }
        if self.retry_attempts == 0 {
            return Err(MinerError::Validation {
                field: "retry_attempts".into(),
                message: "at least one attempt is required".into(),
            });
        }
        if self.fee_multiplier_bps < 10_000 {
            return Err(MinerError::Validation {
                field: "fee_multiplier_bps".into(),
                message: format!("{} would underbid the observed gas price", self.fee_multiplier_bps),
            });
        }
        if self.check_interval_secs == 0 {
            return Err(MinerError::Validation {
                field: "check_interval_secs".into(),
                message: "interval must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn strategy(&self) -> Result<Strategy, MinerError> {
        Strategy::from_str(&self.strategy)
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "sqlite://mitander_miner.db?mode=rwc".to_string())
    }

    pub fn mint_rpc_url(&self) -> String {
        self.mint_rpc_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.l1_rpc_url.clone())
    }

    pub fn daily_budget(&self) -> Result<Option<U256>, MinerError> {
        parse_wei_option(self.daily_budget_wei.as_deref(), "daily_budget_wei")
    }

    pub fn target_yield(&self) -> Result<Option<U256>, MinerError> {
        parse_wei_option(self.target_yield_raw.as_deref(), "target_yield_raw")
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn schedule_hour_set(&self) -> Option<HashSet<u8>> {
        self.schedule_hours
            .as_ref()
            .map(|hours| hours.iter().copied().collect())
    }
}

fn parse_wei_option(raw: Option<&str>, field: &str) -> Result<Option<U256>, MinerError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => U256::from_str(s)
            .map(Some)
            .map_err(|e| MinerError::Validation {
                field: field.to_string(),
                message: format!("'{s}' is not a valid integer amount: {e}"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn base_toml() -> String {
        r#"
wallet_key = "test-key"
l1_rpc_url = "http://localhost:8545"
mint_target_address = "0x00000000000000000000000000000000000face7"
"#
        .to_string()
    }

    fn load_from_toml(body: &str, name: &str) -> Result<MinerSettings, MinerError> {
        let tmp = std::env::temp_dir().join(format!("miner_settings_{name}.toml"));
        fs::write(&tmp, body).expect("write tmp config");
        let loaded = MinerSettings::load_with_path(Some(tmp.to_str().expect("utf8 path")));
        let _ = fs::remove_file(&tmp);
        loaded
    }

    #[test]
    fn defaults_apply() {
        let settings = load_from_toml(&base_toml(), "defaults").expect("load");
        assert_eq!(settings.strategy().unwrap(), Strategy::Auto);
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.fee_multiplier_bps, 15_000);
        assert_eq!(settings.max_payload_bytes, MAX_PAYLOAD_BYTES);
        assert!(settings.daily_budget().unwrap().is_none());
    }

    #[test]
    fn rejects_bad_strategy() {
        let body = format!("{}strategy = \"martingale\"\n", base_toml());
        assert!(load_from_toml(&body, "bad_strategy").is_err());
    }

    #[test]
    fn rejects_out_of_range_hours() {
        let body = format!("{}schedule_hours = [2, 24]\n", base_toml());
        assert!(load_from_toml(&body, "bad_hours").is_err());
    }

    #[test]
    fn rejects_oversized_payload_cap() {
        let body = format!("{}max_payload_bytes = 200000\n", base_toml());
        assert!(load_from_toml(&body, "bad_payload").is_err());
    }

    #[test]
    fn parses_budget_and_target() {
        let body = format!(
            "{}daily_budget_wei = \"1000000000000000000\"\ntarget_yield_raw = \"5\"\n",
            base_toml()
        );
        let settings = load_from_toml(&body, "amounts").expect("load");
        assert_eq!(
            settings.daily_budget().unwrap(),
            Some(U256::from(1_000_000_000_000_000_000u128))
        );
        assert_eq!(settings.target_yield().unwrap(), Some(U256::from(5u64)));
    }
}
