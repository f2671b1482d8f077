//! Price source strategies.
//!
//! Each external price API is one [`PriceSource`] implementation with a
//! uniform fetch contract, so the oracle can walk an ordered provider chain
//! without per-source control flow. Responses are deserialized into typed
//! payloads and validated here; a source either yields a positive finite
//! price or an error.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::{PriceApiConfig, TokenConfig};

/// A single upstream price provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Short provider name for logs and quote attribution.
    fn name(&self) -> &str;

    /// Fetch the USD price for one token. Must return a strictly positive,
    /// finite price or an error; never a sentinel value.
    async fn fetch(&self, token: &TokenConfig) -> Result<f64>;
}

/// Primary source: the exchange's REST ticker, keyed by access key.
pub struct ExchangeTickerSource {
    client: Client,
    base_url: String,
    access_key: String,
    timeout: Duration,
}

/// Ticker payload: `{ status, message, data: { buy, ... } }`.
/// `status` values other than `success` mean the exchange rejected the
/// request even if the HTTP layer said 200.
#[derive(Debug, Deserialize)]
struct TickerResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<TickerData>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    /// Current buy price; the exchange serializes this as either a number
    /// or a numeric string depending on the pair.
    #[serde(default)]
    buy: Option<serde_json::Value>,
}

impl ExchangeTickerSource {
    pub fn new(client: Client, config: &PriceApiConfig) -> Self {
        Self {
            client,
            base_url: config.ticker_base.clone(),
            access_key: config.ticker_access_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl PriceSource for ExchangeTickerSource {
    fn name(&self) -> &str {
        "exchange-ticker"
    }

    #[instrument(skip(self), fields(symbol = %token.symbol))]
    async fn fetch(&self, token: &TokenConfig) -> Result<f64> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("symbol", token.ticker_symbol.as_str()),
                ("accessKey", self.access_key.as_str()),
            ])
            .timeout(self.timeout)
            .send()
            .await
            .context("ticker request failed")?;

        if !response.status().is_success() {
            bail!("ticker returned HTTP {}", response.status());
        }

        let payload: TickerResponse = response
            .json()
            .await
            .context("malformed ticker payload")?;

        if payload.status != "success" {
            bail!(
                "ticker status {:?}: {}",
                payload.status,
                payload.message.as_deref().unwrap_or("no message")
            );
        }

        let buy = payload
            .data
            .and_then(|d| d.buy)
            .ok_or_else(|| anyhow!("ticker response missing buy field"))?;
        let price = numeric_value(&buy)
            .ok_or_else(|| anyhow!("ticker buy field not numeric: {}", buy))?;

        validate_price(token, price)?;
        debug!(price, "fetched {} from exchange ticker", token.symbol);
        Ok(price)
    }
}

/// Fallback source: the public aggregator's simple-price endpoint.
pub struct CoinGeckoSource {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl CoinGeckoSource {
    pub fn new(client: Client, config: &PriceApiConfig) -> Self {
        Self {
            client,
            base_url: config.coingecko_base.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl PriceSource for CoinGeckoSource {
    fn name(&self) -> &str {
        "coingecko"
    }

    #[instrument(skip(self), fields(symbol = %token.symbol))]
    async fn fetch(&self, token: &TokenConfig) -> Result<f64> {
        let id = token
            .coingecko_id
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not listed on the aggregator", token.symbol))?;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("ids", id), ("vs_currencies", "usd")])
            .timeout(self.timeout)
            .send()
            .await
            .context("aggregator request failed")?;

        if !response.status().is_success() {
            bail!("aggregator returned HTTP {}", response.status());
        }

        let payload: HashMap<String, HashMap<String, f64>> = response
            .json()
            .await
            .context("malformed aggregator payload")?;

        let price = payload
            .get(id)
            .and_then(|entry| entry.get("usd"))
            .copied()
            .ok_or_else(|| anyhow!("aggregator response missing {} usd price", id))?;

        validate_price(token, price)?;
        debug!(price, "fetched {} from aggregator", token.symbol);
        Ok(price)
    }
}

fn numeric_value(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn validate_price(token: &TokenConfig, price: f64) -> Result<()> {
    if !price.is_finite() || price <= 0.0 {
        bail!("invalid {} price: {}", token.symbol, price);
    }
    Ok(())
}
