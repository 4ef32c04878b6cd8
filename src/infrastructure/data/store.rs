// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::MinerError;
use crate::domain::types::{MiningTotals, SubmissionResult};
use crate::infrastructure::data::schema::{MineTxRecord, SessionRecord};
use crate::services::mining::economics;
use alloy::primitives::U256;
use sqlx::{
    Pool, Row, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;

pub const RECOVERY_ACTIVE_SESSION: &str = "active_session";

#[derive(Clone)]
pub struct SessionStore {
    pool: Pool<Sqlite>,
}

impl SessionStore {
    pub async fn new(database_url: &str) -> Result<Self, MinerError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| MinerError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| MinerError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| MinerError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn create_session(&self, strategy: &str) -> Result<i64, MinerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sessions (strategy, status)
            VALUES (?, 'active')
            RETURNING id
            "#,
        )
        .bind(strategy)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Session insert failed: {}", e)))?;
        let id: i64 = row.get("id");

        self.save_recovery_state(RECOVERY_ACTIVE_SESSION, &id.to_string())
            .await?;
        Ok(id)
    }

    pub async fn end_session(&self, session_id: i64) -> Result<(), MinerError> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'completed', ended_at = CURRENT_TIMESTAMP
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(session_id)
        .execute(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Session close failed: {}", e)))?;

        self.clear_recovery_state(RECOVERY_ACTIVE_SESSION).await
    }

    /// Session left 'active' by a crash, if any. Corrupt recovery values
    /// (non-numeric, or pointing at a closed/missing session) count as
    /// absent and are wiped so the next start is clean.
    pub async fn find_recoverable_session(&self) -> Result<Option<i64>, MinerError> {
        let Some(raw) = self.load_recovery_state(RECOVERY_ACTIVE_SESSION).await? else {
            return Ok(None);
        };
        let Ok(id) = raw.parse::<i64>() else {
            tracing::warn!(target: "store", value = %raw, "Corrupt recovery state, discarding");
            self.clear_recovery_state(RECOVERY_ACTIVE_SESSION).await?;
            return Ok(None);
        };

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sessions WHERE id = ? AND status = 'active'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Session lookup failed: {}", e)))?;

        if active == 0 {
            self.clear_recovery_state(RECOVERY_ACTIVE_SESSION).await?;
            return Ok(None);
        }
        Ok(Some(id))
    }

    pub async fn append_transaction(
        &self,
        session_id: i64,
        result: &SubmissionResult,
    ) -> Result<i64, MinerError> {
        let row = sqlx::query(
            r#"
            INSERT INTO mine_transactions (
                session_id,
                l1_tx_hash,
                mint_tx_hash,
                cost_wei,
                cost_eth,
                minted_raw,
                minted_tokens,
                efficiency_pct,
                gas_used,
                effective_gas_price_wei,
                base_fee_wei
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(session_id)
        .bind(&result.l1_tx_hash)
        .bind(&result.mint_tx_hash)
        .bind(result.cost_wei.to_string())
        .bind(economics::wei_to_eth(result.cost_wei))
        .bind(result.minted_raw.to_string())
        .bind(economics::wei_to_eth(result.minted_raw))
        .bind(result.efficiency_pct)
        .bind(result.gas_used as i64)
        .bind(result.effective_gas_price_wei.to_string())
        .bind(result.base_fee_at_inclusion_wei.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Transaction insert failed: {}", e)))?;
        let id: i64 = row.get("id");

        Ok(id)
    }

    /// Totals re-aggregated from the append-only log. Wei columns are TEXT,
    /// so summation happens here in U256 rather than in SQL.
    pub async fn session_totals(&self, session_id: i64) -> Result<MiningTotals, MinerError> {
        let rows = sqlx::query("SELECT cost_wei, minted_raw FROM mine_transactions WHERE session_id = ?")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MinerError::Persistence(format!("Totals query failed: {}", e)))?;

        Self::sum_rows(rows)
    }

    pub async fn all_time_totals(&self) -> Result<MiningTotals, MinerError> {
        let rows = sqlx::query("SELECT cost_wei, minted_raw FROM mine_transactions")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MinerError::Persistence(format!("Totals query failed: {}", e)))?;

        Self::sum_rows(rows)
    }

    pub async fn recent_sessions(&self, limit: i64) -> Result<Vec<SessionRecord>, MinerError> {
        sqlx::query_as::<_, SessionRecord>(
            "SELECT * FROM sessions ORDER BY started_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Query failed: {}", e)))
    }

    pub async fn recent_transactions(&self, limit: i64) -> Result<Vec<MineTxRecord>, MinerError> {
        sqlx::query_as::<_, MineTxRecord>(
            "SELECT * FROM mine_transactions ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Query failed: {}", e)))
    }

    pub async fn save_recovery_state(&self, key: &str, value: &str) -> Result<(), MinerError> {
        sqlx::query(
            r#"
            INSERT INTO recovery_state (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| MinerError::Persistence(format!("Recovery upsert failed: {}", e)))?;
        Ok(())
    }

    pub async fn load_recovery_state(&self, key: &str) -> Result<Option<String>, MinerError> {
        let row = sqlx::query("SELECT value FROM recovery_state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MinerError::Persistence(format!("Recovery load failed: {}", e)))?;
        Ok(row.map(|r| r.get("value")))
    }

    pub async fn clear_recovery_state(&self, key: &str) -> Result<(), MinerError> {
        sqlx::query("DELETE FROM recovery_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| MinerError::Persistence(format!("Recovery delete failed: {}", e)))?;
        Ok(())
    }

    fn sum_rows(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<MiningTotals, MinerError> {
        let mut totals = MiningTotals::default();
        for row in rows {
            let cost: String = row.get("cost_wei");
            let minted: String = row.get("minted_raw");
            let cost = U256::from_str(&cost).map_err(|e| {
                MinerError::Persistence(format!("Stored cost_wei '{cost}' unreadable: {e}"))
            })?;
            let minted = U256::from_str(&minted).map_err(|e| {
                MinerError::Persistence(format!("Stored minted_raw '{minted}' unreadable: {e}"))
            })?;
            totals.transactions += 1;
            totals.spent_wei = totals.spent_wei.saturating_add(cost);
            totals.minted_raw = totals.minted_raw.saturating_add(minted);
        }
        Ok(totals)
    }
}
