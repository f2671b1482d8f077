//! The price oracle: an ordered chain of sources with per-source retries,
//! a per-run quote cache, and batch lookups that isolate per-symbol
//! failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use moka::future::Cache;
use nonempty::NonEmpty;
use reqwest::Client;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::Retry;
use tracing::{debug, instrument, warn};

use crate::config::{PriceApiConfig, TokenConfig, STABLECOIN_SYMBOL};
use crate::pricing::sources::{CoinGeckoSource, ExchangeTickerSource, PriceSource};
use crate::types::PriceQuote;

/// How long a fetched quote stays reusable within one run.
const QUOTE_TTL: Duration = Duration::from_secs(60);

/// USD price oracle over an ordered, non-empty provider chain.
///
/// The cache is owned by the oracle instance and dies with it; there is no
/// process-wide price state.
pub struct PriceOracle {
    sources: NonEmpty<Arc<dyn PriceSource>>,
    cache: Cache<String, PriceQuote>,
    retry_attempts: usize,
}

impl PriceOracle {
    /// Oracle with the production source chain: exchange ticker first,
    /// public aggregator as fallback.
    pub fn new(config: &PriceApiConfig) -> Self {
        let client = Client::new();
        let primary: Arc<dyn PriceSource> =
            Arc::new(ExchangeTickerSource::new(client.clone(), config));
        let fallback: Arc<dyn PriceSource> = Arc::new(CoinGeckoSource::new(client, config));
        Self::with_sources(NonEmpty::from((primary, vec![fallback])), config.retry_attempts)
    }

    /// Oracle over an explicit source chain, tried in order.
    pub fn with_sources(sources: NonEmpty<Arc<dyn PriceSource>>, retry_attempts: usize) -> Self {
        Self {
            sources,
            cache: Cache::builder().time_to_live(QUOTE_TTL).build(),
            retry_attempts: retry_attempts.max(1),
        }
    }

    /// Fetch the USD price for one token, walking the source chain.
    ///
    /// The stablecoin short-circuits to $1 with no network call. Every
    /// source failure is logged and swallowed; `None` means the whole
    /// chain failed.
    #[instrument(skip(self), fields(symbol = %token.symbol))]
    pub async fn token_price(&self, token: &TokenConfig) -> Option<PriceQuote> {
        if token.symbol == STABLECOIN_SYMBOL {
            return PriceQuote::new(&token.symbol, 1.0, "fixed").ok();
        }

        if let Some(quote) = self.cache.get(&token.symbol).await {
            debug!("using cached {} quote from {}", token.symbol, quote.source);
            return Some(quote);
        }

        for source in self.sources.iter() {
            let backoff = ExponentialBackoff::from_millis(500)
                .max_delay(Duration::from_secs(3))
                .take(self.retry_attempts - 1);
            let attempt = Retry::spawn(backoff, || source.fetch(token)).await;

            match attempt {
                Ok(price) => match PriceQuote::new(&token.symbol, price, source.name()) {
                    Ok(quote) => {
                        self.cache.insert(token.symbol.clone(), quote.clone()).await;
                        return Some(quote);
                    }
                    Err(err) => {
                        warn!("{} rejected {} quote: {err:#}", source.name(), token.symbol);
                    }
                },
                Err(err) => {
                    warn!(
                        "{} failed for {}, trying next source: {err:#}",
                        source.name(),
                        token.symbol
                    );
                }
            }
        }

        warn!("every price source failed for {}", token.symbol);
        None
    }

    /// Fetch prices for a batch of tokens concurrently.
    ///
    /// One symbol's failure never fails the batch; the result map carries
    /// an entry (possibly `None`) for every requested token.
    #[instrument(skip_all, fields(count = tokens.len()))]
    pub async fn token_prices(&self, tokens: &[TokenConfig]) -> HashMap<String, Option<PriceQuote>> {
        let lookups = tokens.iter().map(|token| async move {
            (token.symbol.clone(), self.token_price(token).await)
        });
        join_all(lookups).await.into_iter().collect()
    }
}
