// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::MinerError;
use crate::common::retry::retry_async;
use crate::domain::constants::{MAX_BACKOFF_MS, RECEIPT_POLL_MS};
use crate::domain::types::{FeeParams, NetworkConditions};
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, U256, keccak256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::{BlockNumberOrTag, TransactionRequest};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

/// Receipt of the outer (settlement-layer) transaction.
#[derive(Debug, Clone)]
pub struct OuterReceipt {
    pub gas_used: u64,
    pub effective_gas_price_wei: u128,
    pub base_fee_wei: u128,
}

/// Confirmed derivation-layer mint entry.
#[derive(Debug, Clone)]
pub struct MintReceipt {
    pub minted_raw: U256,
}

/// Contract between the mining engine and the ledger. The engine never
/// builds or signs transactions itself; it hands a payload and fee to this
/// collaborator and waits on the two confirmation layers.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Submit the payload; returns (outer tx id, derived mint tx id).
    async fn submit(&self, payload: &[u8], fee: FeeParams) -> Result<(String, String), MinerError>;

    async fn await_outer_confirmation(
        &self,
        l1_tx_hash: &str,
        timeout: Duration,
    ) -> Result<OuterReceipt, MinerError>;

    async fn await_mint_confirmation(
        &self,
        mint_tx_hash: &str,
        timeout: Duration,
    ) -> Result<(), MinerError>;

    async fn get_mint_transaction(&self, mint_tx_hash: &str) -> Result<MintReceipt, MinerError>;

    async fn get_conditions(&self) -> Result<NetworkConditions, MinerError>;
}

/// Serialized account sequence numbers. Submissions within a session are
/// strictly ordered, so a cached counter bumped per assignment is enough;
/// `resync` drops the cache after a failed or replaced submission.
#[derive(Clone)]
pub struct NonceManager {
    provider: DynProvider,
    address: Address,
    cache: Arc<Mutex<Option<u64>>>,
}

impl NonceManager {
    pub fn new(provider: DynProvider, address: Address) -> Self {
        Self {
            provider,
            address,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn next_nonce(&self) -> Result<u64, MinerError> {
        {
            let mut guard = self.cache.lock().unwrap();
            if let Some(cached) = *guard {
                *guard = Some(cached + 1);
                return Ok(cached);
            }
        }

        let provider = self.provider.clone();
        let address = self.address;
        let on_chain: u64 = retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).pending().await }
            },
            3,
            Duration::from_millis(100),
            Duration::from_millis(MAX_BACKOFF_MS),
        )
        .await
        .map_err(|e| MinerError::Connection(format!("Failed to fetch nonce: {}", e)))?;

        *self.cache.lock().unwrap() = Some(on_chain + 1);
        Ok(on_chain)
    }

    pub fn resync(&self) {
        *self.cache.lock().unwrap() = None;
    }
}

/// Ledger client over an HTTP provider plus the derivation-layer node's
/// JSON-RPC endpoint (untyped; alloy has no bindings for the mint layer).
pub struct RpcLedgerClient {
    provider: DynProvider,
    nonce_manager: NonceManager,
    mint_target: Address,
    mint_rpc_url: String,
    http: reqwest::Client,
    last_good_conditions: Arc<Mutex<Option<NetworkConditions>>>,
}

impl RpcLedgerClient {
    pub fn new(
        provider: DynProvider,
        wallet_address: Address,
        mint_target: Address,
        mint_rpc_url: String,
    ) -> Self {
        let nonce_manager = NonceManager::new(provider.clone(), wallet_address);
        Self {
            provider,
            nonce_manager,
            mint_target,
            mint_rpc_url,
            http: reqwest::Client::new(),
            last_good_conditions: Arc::new(Mutex::new(None)),
        }
    }

    async fn mint_rpc<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, MinerError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self
            .http
            .post(&self.mint_rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| MinerError::Connection(format!("Mint RPC POST failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(MinerError::ApiCall {
                provider: format!("mint rpc {method}"),
                status: resp.status().as_u16(),
            });
        }
        let body: MintRpcResponse<T> = resp
            .json()
            .await
            .map_err(|e| MinerError::Initialization(format!("Mint RPC decode failed: {e}")))?;
        match (body.result, body.error) {
            (Some(result), _) => Ok(result),
            (None, Some(err)) => Err(MinerError::Connection(format!(
                "Mint RPC {method} error {}: {}",
                err.code, err.message
            ))),
            // A null result is a valid answer for nullable queries
            // (e.g. transaction not yet indexed).
            (None, None) => serde_json::from_value(serde_json::Value::Null).map_err(|_| {
                MinerError::Connection(format!("Mint RPC {method} returned no result"))
            }),
        }
    }

    async fn base_fee_at(&self, block_number: u64) -> Option<u128> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .ok()??;
        block.header.base_fee_per_gas.map(|v| v as u128)
    }

    async fn fetch_conditions(&self) -> Result<NetworkConditions, MinerError> {
        let provider = self.provider.clone();
        let history = retry_async(
            move |_| {
                let provider = provider.clone();
                async move {
                    provider
                        .get_fee_history(5, BlockNumberOrTag::Latest, &[50.0f64])
                        .await
                }
            },
            3,
            Duration::from_millis(100),
            Duration::from_millis(MAX_BACKOFF_MS),
        )
        .await
        .map_err(|e| MinerError::Connection(format!("Fee history failed: {}", e)))?;

        let base_fee = history
            .latest_block_base_fee()
            .or_else(|| history.base_fee_per_gas.iter().rev().nth(1).copied())
            .ok_or(MinerError::Initialization("No base fee history".into()))?;

        let mut tip_sum = 0u128;
        let mut tip_count = 0u128;
        if let Some(rewards) = &history.reward {
            for block_reward in rewards {
                if let Some(r) = block_reward.first() {
                    tip_sum = tip_sum.saturating_add(*r);
                    tip_count = tip_count.saturating_add(1);
                }
            }
        }
        let avg_tip = if tip_count > 0 {
            tip_sum / tip_count
        } else {
            2_000_000_000
        };

        let mint_rate_hex: String = self.mint_rpc("mint_mintRate", json!([])).await?;
        let mint_rate = parse_hex_u128(&mint_rate_hex)?;

        Ok(NetworkConditions {
            base_fee_wei: base_fee,
            gas_price_wei: base_fee.saturating_add(avg_tip),
            mint_rate,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl LedgerClient for RpcLedgerClient {
    async fn submit(&self, payload: &[u8], fee: FeeParams) -> Result<(String, String), MinerError> {
        let nonce = self.nonce_manager.next_nonce().await?;
        let gas_limit = crate::domain::constants::BASE_TX_GAS
            .saturating_add(payload.len() as u64 * crate::domain::constants::NONZERO_BYTE_GAS);

        let tx = TransactionRequest::default()
            .with_to(self.mint_target)
            .with_input(payload.to_vec())
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(fee.max_fee_per_gas_wei)
            .with_max_priority_fee_per_gas(fee.max_priority_fee_per_gas_wei);

        let pending = self.provider.send_transaction(tx).await.map_err(|e| {
            self.nonce_manager.resync();
            MinerError::Submission {
                hash: String::new(),
                reason: e.to_string(),
            }
        })?;

        let l1_tx_hash = format!("{:#x}", pending.tx_hash());
        // The derivation layer computes the mint tx id deterministically
        // from the settlement tx hash, so both ids are known at submit time.
        let mint_tx_hash = format!("{:#x}", keccak256(pending.tx_hash().as_slice()));
        Ok((l1_tx_hash, mint_tx_hash))
    }

    async fn await_outer_confirmation(
        &self,
        l1_tx_hash: &str,
        timeout: Duration,
    ) -> Result<OuterReceipt, MinerError> {
        let hash = B256::from_str(l1_tx_hash).map_err(|e| MinerError::Submission {
            hash: l1_tx_hash.to_string(),
            reason: format!("invalid tx hash: {e}"),
        })?;

        let poll = async {
            loop {
                if let Ok(Some(receipt)) = self.provider.get_transaction_receipt(hash).await {
                    if !receipt.status() {
                        return Err(MinerError::Submission {
                            hash: l1_tx_hash.to_string(),
                            reason: "transaction reverted".into(),
                        });
                    }
                    let base_fee = match receipt.block_number {
                        Some(n) => self.base_fee_at(n).await,
                        None => None,
                    };
                    return Ok(OuterReceipt {
                        gas_used: receipt.gas_used,
                        effective_gas_price_wei: receipt.effective_gas_price,
                        base_fee_wei: base_fee.unwrap_or(receipt.effective_gas_price),
                    });
                }
                sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| MinerError::ConfirmationTimeout {
                hash: l1_tx_hash.to_string(),
                waited_ms: timeout.as_millis() as u64,
            })?
    }

    async fn await_mint_confirmation(
        &self,
        mint_tx_hash: &str,
        timeout: Duration,
    ) -> Result<(), MinerError> {
        let poll = async {
            loop {
                let entry: Option<MintTxEntry> = self
                    .mint_rpc("mint_getTransactionByHash", json!([mint_tx_hash]))
                    .await?;
                if let Some(entry) = entry
                    && entry.status == "success"
                {
                    return Ok(());
                }
                sleep(Duration::from_millis(RECEIPT_POLL_MS)).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| MinerError::ConfirmationTimeout {
                hash: mint_tx_hash.to_string(),
                waited_ms: timeout.as_millis() as u64,
            })?
    }

    async fn get_mint_transaction(&self, mint_tx_hash: &str) -> Result<MintReceipt, MinerError> {
        let entry: Option<MintTxEntry> = self
            .mint_rpc("mint_getTransactionByHash", json!([mint_tx_hash]))
            .await?;
        let entry = entry.ok_or_else(|| MinerError::Submission {
            hash: mint_tx_hash.to_string(),
            reason: "mint transaction not found".into(),
        })?;
        let minted_raw = U256::from_str(&entry.minted_amount).map_err(|e| {
            MinerError::Initialization(format!("Invalid mintedAmount from mint rpc: {e}"))
        })?;
        Ok(MintReceipt { minted_raw })
    }

    async fn get_conditions(&self) -> Result<NetworkConditions, MinerError> {
        match self.fetch_conditions().await {
            Ok(conditions) => {
                if let Ok(mut guard) = self.last_good_conditions.lock() {
                    *guard = Some(conditions.clone());
                }
                Ok(conditions)
            }
            Err(e) => {
                // Stale-but-recent conditions beat a dead cycle.
                if let Ok(guard) = self.last_good_conditions.lock()
                    && let Some(cached) = guard.clone()
                {
                    tracing::warn!(target: "ledger", error = %e, "Using last good conditions");
                    return Ok(cached);
                }
                Err(e)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct MintRpcResponse<T> {
    result: Option<T>,
    error: Option<MintRpcError>,
}

#[derive(Debug, Deserialize)]
struct MintRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct MintTxEntry {
    status: String,
    #[serde(rename = "mintedAmount")]
    minted_amount: String,
}

fn parse_hex_u128(raw: &str) -> Result<u128, MinerError> {
    let stripped = raw.strip_prefix("0x").unwrap_or(raw);
    u128::from_str_radix(stripped, 16)
        .map_err(|e| MinerError::Initialization(format!("Invalid hex quantity '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_quantity_parses_with_and_without_prefix() {
        assert_eq!(parse_hex_u128("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u128("ff").unwrap(), 255);
        assert!(parse_hex_u128("0xzz").is_err());
    }

    #[test]
    fn derived_mint_hash_is_deterministic() {
        let outer = B256::from([7u8; 32]);
        let a = format!("{:#x}", keccak256(outer.as_slice()));
        let b = format!("{:#x}", keccak256(outer.as_slice()));
        assert_eq!(a, b);
        assert_ne!(a, format!("{outer:#x}"));
    }
}
