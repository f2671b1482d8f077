//! Core value types shared across the staking administration toolkit.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::math::fixed_point::scale_conversion_rate;

/// A USD price observation for a single token symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Token symbol, e.g. "BTC"
    pub symbol: String,
    /// USD price; always strictly positive and finite
    pub usd_price: f64,
    /// Name of the source the quote came from
    pub source: String,
    /// When the quote was fetched
    pub fetched_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Build a quote, rejecting non-finite or non-positive prices.
    pub fn new(symbol: &str, usd_price: f64, source: &str) -> Result<Self> {
        if !usd_price.is_finite() || usd_price <= 0.0 {
            bail!("invalid {} price from {}: {}", symbol, source, usd_price);
        }
        Ok(Self {
            symbol: symbol.to_string(),
            usd_price,
            source: source.to_string(),
            fetched_at: Utc::now(),
        })
    }
}

/// Price ratio between the reward token and the staked native token.
///
/// The float form is kept for diagnostics and report output; the scaled
/// integer form (`rate * 10^18`) is what every downstream calculation uses.
/// The float-to-fixed-point conversion happens exactly once, here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRate {
    /// How many staked-token units one reward-token unit is worth
    pub rate: f64,
    /// `rate` scaled by 10^18, decomposed through a decimal string
    pub scaled: U256,
}

impl ConversionRate {
    /// Derive the conversion rate from two USD quotes.
    pub fn from_prices(reward_usd: f64, staked_usd: f64) -> Result<Self> {
        if !reward_usd.is_finite() || reward_usd <= 0.0 {
            bail!("reward token USD price must be positive, got {}", reward_usd);
        }
        if !staked_usd.is_finite() || staked_usd <= 0.0 {
            bail!("staked token USD price must be positive, got {}", staked_usd);
        }
        let rate = reward_usd / staked_usd;
        let scaled = scale_conversion_rate(rate)?;
        Ok(Self { rate, scaled })
    }
}

/// Static parameters describing a reward pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolParameters {
    /// Index of the pool in the staking contract
    pub pool_index: u64,
    /// Decimal precision of the reward token (0-18)
    pub reward_token_decimals: u8,
    /// Decimal precision of the staked native token (always 18)
    pub staked_token_decimals: u8,
    /// Target annual percentage rate, e.g. 100 = 100%
    pub target_apr: f64,
    /// Period over which a funded reward is distributed, in seconds
    pub rewards_duration_secs: u64,
}

impl PoolParameters {
    pub fn validate(&self) -> Result<()> {
        if self.reward_token_decimals > 18 {
            bail!(
                "reward token decimals out of range: {}",
                self.reward_token_decimals
            );
        }
        if !self.target_apr.is_finite() || self.target_apr < 0.0 {
            bail!("target APR must be non-negative, got {}", self.target_apr);
        }
        if self.rewards_duration_secs == 0 {
            bail!("rewards duration must be positive");
        }
        Ok(())
    }
}

/// Pool state read from the staking contract. External truth; the toolkit
/// never mutates this locally, only proposes corrective transactions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnChainPoolState {
    /// Address of the reward token for this pool
    pub reward_token: Address,
    /// Total staked amount in 18-decimal native wei
    pub total_staked_wei: U256,
    /// Per-second reward emission in the reward token's smallest unit
    pub reward_rate: U256,
    /// Unix timestamp at which the current reward period ends
    pub period_finish: u64,
    /// Last time the contract accrued rewards
    pub last_update_time: u64,
    /// Configured reward distribution period in seconds
    pub rewards_duration: u64,
    /// Whether the pool is accepting stakes
    pub active: bool,
}

/// Compact pool snapshot from the contract's `getPoolInfo` view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolInfo {
    pub reward_token: Address,
    pub total_staked_wei: U256,
    pub reward_rate: U256,
    pub period_finish: u64,
    pub active: bool,
}

/// Output of the forward reward-rate calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRateResult {
    /// Required per-second emission, ceiling-rounded
    pub reward_per_second: U256,
    /// Annual reward in the reward token's smallest unit
    pub annual_reward_token: U256,
    /// Annual reward denominated in native wei
    pub annual_reward_native_wei: U256,
}

impl RewardRateResult {
    pub fn zero() -> Self {
        Self {
            reward_per_second: U256::ZERO,
            annual_reward_token: U256::ZERO,
            annual_reward_native_wei: U256::ZERO,
        }
    }
}

/// Output of the reverse APR calculation. Diagnostic only; never feeds a
/// correction transaction without a fresh forward computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AprDiagnosis {
    /// APR implied by the on-chain reward rate, as a percentage
    pub implied_apr: f64,
    /// Annual reward in the reward token's smallest unit
    pub annual_reward_token: U256,
    /// Annual reward denominated in native wei
    pub annual_reward_native_wei: U256,
}

impl AprDiagnosis {
    pub fn zero() -> Self {
        Self {
            implied_apr: 0.0,
            annual_reward_token: U256::ZERO,
            annual_reward_native_wei: U256::ZERO,
        }
    }
}
