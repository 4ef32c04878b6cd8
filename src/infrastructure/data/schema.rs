// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use chrono::NaiveDateTime;
use sqlx::FromRow;

#[derive(Debug, FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub strategy: String,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

/// One confirmed mining transaction. Wei quantities live in TEXT columns
/// (they do not fit SQLite integers); the *_eth / *_tokens columns are
/// lossy display copies for ad-hoc SQL.
#[derive(Debug, FromRow)]
pub struct MineTxRecord {
    pub id: i64,
    pub session_id: i64,
    pub l1_tx_hash: String,
    pub mint_tx_hash: String,
    pub cost_wei: String,
    pub cost_eth: f64,
    pub minted_raw: String,
    pub minted_tokens: f64,
    pub efficiency_pct: f64,
    pub gas_used: i64,
    pub effective_gas_price_wei: String,
    pub base_fee_wei: String,
    pub timestamp: NaiveDateTime,
}
