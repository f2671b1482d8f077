//! USD price discovery for reward and native tokens: ordered source
//! strategies with fallback, retry, and per-run caching.

pub mod oracle;
pub mod sources;

pub use oracle::PriceOracle;
pub use sources::{CoinGeckoSource, ExchangeTickerSource, PriceSource};
