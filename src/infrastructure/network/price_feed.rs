// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::MinerError;
use crate::domain::constants::{DEFAULT_ETH_USD_RATE, QUOTE_CACHE_TTL_SECS};
use alloy::primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Source of the secondary-market spot price for the minted token, in wei
/// per whole (18-decimal) token. `None` means no market is configured or
/// the quote is currently unavailable; consumers treat that as "no signal".
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn spot_price_wei(&self) -> Option<U256>;
}

/// Source of the advisory ETH/USD rate used for display conversions.
#[async_trait]
pub trait FiatSource: Send + Sync {
    async fn eth_usd_rate(&self) -> f64;
}

struct CachedQuote<T> {
    value: T,
    fetched_at: Instant,
}

/// HTTP price feed with a short TTL cache so a tight cycle interval does
/// not hammer the quote endpoints.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    spot_url: Option<String>,
    fiat_url: Option<String>,
    ttl: Duration,
    spot_cache: Arc<RwLock<Option<CachedQuote<Option<U256>>>>>,
    fiat_cache: Arc<RwLock<Option<CachedQuote<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct SpotQuoteResponse {
    /// Decimal wei string, e.g. "1234500000000".
    price_wei: String,
}

#[derive(Debug, Deserialize)]
struct FiatRateResponse {
    price: String,
}

impl HttpPriceFeed {
    pub fn new(spot_url: Option<String>, fiat_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            spot_url,
            fiat_url,
            ttl: Duration::from_secs(QUOTE_CACHE_TTL_SECS),
            spot_cache: Arc::new(RwLock::new(None)),
            fiat_cache: Arc::new(RwLock::new(None)),
        }
    }

    async fn fetch_spot(&self, url: &str) -> Result<U256, MinerError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MinerError::Connection(format!("Spot quote fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(MinerError::ApiCall {
                provider: "spot quote".into(),
                status: resp.status().as_u16(),
            });
        }
        let body: SpotQuoteResponse = resp
            .json()
            .await
            .map_err(|e| MinerError::Initialization(format!("Spot quote decode failed: {e}")))?;
        U256::from_str(&body.price_wei)
            .map_err(|e| MinerError::Initialization(format!("Spot quote not a wei amount: {e}")))
    }

    async fn fetch_fiat(&self, url: &str) -> Result<f64, MinerError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MinerError::Connection(format!("Fiat rate fetch failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(MinerError::ApiCall {
                provider: "fiat rate".into(),
                status: resp.status().as_u16(),
            });
        }
        let body: FiatRateResponse = resp
            .json()
            .await
            .map_err(|e| MinerError::Initialization(format!("Fiat rate decode failed: {e}")))?;
        body.price
            .parse::<f64>()
            .map_err(|e| MinerError::Initialization(format!("Fiat rate not a number: {e}")))
    }
}

#[async_trait]
impl QuoteSource for HttpPriceFeed {
    async fn spot_price_wei(&self) -> Option<U256> {
        let url = self.spot_url.as_deref()?;

        if let Some(cached) = self.spot_cache.read().await.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return cached.value;
        }

        let value = match self.fetch_spot(url).await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::warn!(target: "price_feed", error = %e, "Spot quote unavailable");
                None
            }
        };
        *self.spot_cache.write().await = Some(CachedQuote {
            value,
            fetched_at: Instant::now(),
        });
        value
    }
}

#[async_trait]
impl FiatSource for HttpPriceFeed {
    async fn eth_usd_rate(&self) -> f64 {
        let Some(url) = self.fiat_url.as_deref() else {
            return DEFAULT_ETH_USD_RATE;
        };

        if let Some(cached) = self.fiat_cache.read().await.as_ref()
            && cached.fetched_at.elapsed() < self.ttl
        {
            return cached.value;
        }

        let value = match self.fetch_fiat(url).await {
            Ok(rate) if rate > 0.0 => rate,
            Ok(rate) => {
                tracing::warn!(target: "price_feed", rate, "Non-positive fiat rate, using default");
                DEFAULT_ETH_USD_RATE
            }
            Err(e) => {
                tracing::warn!(target: "price_feed", error = %e, "Fiat rate unavailable, using default");
                DEFAULT_ETH_USD_RATE
            }
        };
        *self.fiat_cache.write().await = Some(CachedQuote {
            value,
            fetched_at: Instant::now(),
        });
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_spot_source_yields_no_signal() {
        let feed = HttpPriceFeed::new(None, None);
        assert_eq!(feed.spot_price_wei().await, None);
    }

    #[tokio::test]
    async fn unconfigured_fiat_source_falls_back_to_default() {
        let feed = HttpPriceFeed::new(None, None);
        assert_eq!(feed.eth_usd_rate().await, DEFAULT_ETH_USD_RATE);
    }

    #[tokio::test]
    async fn unreachable_spot_endpoint_degrades_to_none() {
        let feed = HttpPriceFeed::new(Some("http://127.0.0.1:1/quote".into()), None);
        assert_eq!(feed.spot_price_wei().await, None);
    }
}
