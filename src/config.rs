//! Runtime configuration: chain endpoints, adjuster tuning and the static
//! reward-pool token table.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::math::fixed_point::parse_units;
use crate::math::reward_rate::SECONDS_PER_YEAR;

/// Symbol whose price is pinned to $1 without a network call.
pub const STABLECOIN_SYMBOL: &str = "USDT";

/// Symbol of the staked native token.
pub const NATIVE_SYMBOL: &str = "NBC";

/// Per-pool reward token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Display symbol, e.g. "BTC"
    pub symbol: String,
    /// Pool index in the staking contract
    pub pool_index: u64,
    /// ERC-20 address of the reward token
    pub address: Address,
    /// Reward token decimal precision
    pub decimals: u8,
    /// Pair symbol on the exchange ticker API, e.g. "btcusdt"
    pub ticker_symbol: String,
    /// Asset id on the fallback aggregator, where listed
    pub coingecko_id: Option<String>,
    /// Whether the deployed token contract exposes an owner-only mint
    pub mintable: bool,
}

/// Price API endpoints and credentials.
#[derive(Debug, Clone)]
pub struct PriceApiConfig {
    /// Exchange ticker endpoint (primary source)
    pub ticker_base: String,
    /// Access key appended to every ticker request
    pub ticker_access_key: String,
    /// Public aggregator endpoint (fallback source)
    pub coingecko_base: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per source before falling through to the next one
    pub retry_attempts: usize,
}

impl Default for PriceApiConfig {
    fn default() -> Self {
        Self {
            ticker_base: "https://www.nbcex.com/v1/rest/api/market/ticker".to_string(),
            ticker_access_key: String::new(),
            coingecko_base: "https://api.coingecko.com/api/v3/simple/price".to_string(),
            timeout_secs: 10,
            retry_attempts: 3,
        }
    }
}

/// Everything a reconciliation run needs beyond the token table.
#[derive(Debug, Clone)]
pub struct AdjusterConfig {
    /// JSON-RPC endpoint of the chain
    pub rpc_url: String,
    /// Hex private key for write operations; reads work without it
    pub private_key: Option<String>,
    /// Deployed staking contract
    pub staking_contract: Address,
    /// Expected total stake in native wei, used when computing target rates
    pub expected_staked_wei: U256,
    /// Target APR percentage
    pub target_apr: f64,
    /// Expected rewards duration in seconds
    pub rewards_duration_secs: u64,
    /// Minimum relative reward-rate deviation (percent) that justifies a
    /// correction transaction
    pub min_change_threshold_pct: f64,
    /// Price API settings
    pub price_api: PriceApiConfig,
}

impl AdjusterConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.target_apr.is_finite() || self.target_apr < 0.0 {
            bail!("target APR must be non-negative, got {}", self.target_apr);
        }
        if self.rewards_duration_secs == 0 {
            bail!("rewards duration must be positive");
        }
        if !self.min_change_threshold_pct.is_finite() || self.min_change_threshold_pct < 0.0 {
            bail!(
                "change threshold must be non-negative, got {}",
                self.min_change_threshold_pct
            );
        }
        Ok(())
    }

    /// Parse a human NBC amount (whole tokens or raw wei) into wei.
    /// Values with 18+ digits and no decimal point are taken as raw wei,
    /// matching how the original deployment passed `TOTAL_STAKED_NBC`.
    pub fn parse_staked_amount(raw: &str) -> Result<U256> {
        let raw = raw.trim();
        if !raw.contains('.') && raw.len() >= 19 {
            return U256::from_str_radix(raw, 10)
                .with_context(|| format!("invalid staked wei amount {:?}", raw));
        }
        parse_units(raw, 18)
    }
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://rpc.nbcex.com".to_string(),
            private_key: None,
            staking_contract: Address::ZERO,
            expected_staked_wei: U256::from(10u64).pow(U256::from(24u64)),
            target_apr: 100.0,
            rewards_duration_secs: SECONDS_PER_YEAR,
            min_change_threshold_pct: 5.0,
            price_api: PriceApiConfig::default(),
        }
    }
}

fn token(
    symbol: &str,
    pool_index: u64,
    address: &str,
    decimals: u8,
    ticker_symbol: &str,
    coingecko_id: Option<&str>,
) -> TokenConfig {
    TokenConfig {
        symbol: symbol.to_string(),
        pool_index,
        // The table below is static deployment data; parse failures here
        // are programming errors, not runtime conditions.
        address: address.parse().unwrap_or(Address::ZERO),
        decimals,
        ticker_symbol: ticker_symbol.to_string(),
        coingecko_id: coingecko_id.map(str::to_string),
        mintable: true,
    }
}

/// The deployed reward-pool table. Pool 8 was retired and the index is
/// intentionally absent.
pub fn default_tokens() -> Vec<TokenConfig> {
    vec![
        token("BTC", 1, "0xb225C29Da2CaB86991b7e0651c63f0fD5C16613C", 8, "btcusdt", Some("bitcoin")),
        token("ETH", 2, "0x1Feba2E24a6b7F1D07F55Aa7ba59a4a4bAF9f908", 18, "ethusdt", Some("ethereum")),
        token("SOL", 3, "0xd5eECCC885Ef850d90AE40E716c3dFCe5C3D4c81", 18, "solusdt", Some("solana")),
        token("BNB", 4, "0x9C43237490272BfdD2F1d1ca0B34f20b1A3C9f5c", 18, "bnbusdt", Some("binancecoin")),
        token("XRP", 5, "0x48e1772534fabBdcaDe9ca4005E5Ee8BF4190093", 18, "xrpusdt", Some("ripple")),
        token("LTC", 6, "0x8d22041C22d696fdfF0703852a706a40Ff65a7de", 18, "ltcusdt", Some("litecoin")),
        token("DOGE", 7, "0x8cEb9a93405CDdf3D76f72327F868Bd3E8755D89", 18, "dogeusdt", Some("dogecoin")),
        token("USDT", 9, "0xfd1508502696d0E1910eD850c6236d965cc4db11", 6, "usdtusdt", Some("tether")),
        token("SUI", 10, "0x9011191E84Ad832100Ddc891E360f8402457F55E", 18, "suiusdt", Some("sui")),
    ]
}

/// Ticker configuration for the staked native token itself. It is only
/// listed on the project exchange, so there is no aggregator fallback id.
pub fn native_token() -> TokenConfig {
    TokenConfig {
        symbol: NATIVE_SYMBOL.to_string(),
        pool_index: 0,
        address: Address::ZERO,
        decimals: 18,
        ticker_symbol: "nbcusdt".to_string(),
        coingecko_id: None,
        mintable: false,
    }
}

/// Resolve a `--pool` argument to the pools it names.
pub fn select_pools(tokens: &[TokenConfig], selector: &str) -> Result<Vec<TokenConfig>> {
    if selector.eq_ignore_ascii_case("all") {
        return Ok(tokens.to_vec());
    }
    let wanted = selector.to_ascii_uppercase();
    match tokens.iter().find(|t| t.symbol == wanted) {
        Some(t) => Ok(vec![t.clone()]),
        None => {
            let supported: Vec<&str> = tokens.iter().map(|t| t.symbol.as_str()).collect();
            bail!(
                "unknown pool symbol {:?}; supported: {}",
                selector,
                supported.join(", ")
            )
        }
    }
}
