//! Forward and reverse reward-rate math.
//!
//! The forward direction answers "what per-second emission delivers the
//! target APR at this stake level"; the reverse direction answers "what APR
//! does the on-chain rate actually imply". Both work in U256 end to end;
//! floats appear only at the final diagnostic APR percentage.

use alloy::primitives::U256;
use anyhow::{bail, Context, Result};

use crate::math::fixed_point::{pow10, scale_conversion_rate, u256_to_f64};
use crate::types::{AprDiagnosis, RewardRateResult};

/// 365-day year, matching the contract's reward period accounting.
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Basis-point denominator used to apply the APR without float-on-U256
/// multiplication.
const BPS_DENOMINATOR: u64 = 10_000;

/// Compute the per-second reward emission required to deliver `target_apr`
/// on `total_staked_wei`, paid in a reward token with
/// `reward_token_decimals` precision.
///
/// The per-second rate is ceiling-rounded: a floored rate compounded over
/// the year under-delivers the promised APR, and underpaying stakers is
/// worse than the bounded overpay the ceiling introduces.
///
/// An empty pool yields an all-zero result rather than an error; the APR of
/// nothing is undefined and reported as a zero rate. A zero conversion rate
/// is an input-validation failure and is rejected.
pub fn calculate_reward_rate(
    target_apr: f64,
    total_staked_wei: U256,
    conversion_rate_scaled: U256,
    reward_token_decimals: u8,
) -> Result<RewardRateResult> {
    if !target_apr.is_finite() || target_apr < 0.0 {
        bail!("target APR must be non-negative and finite, got {}", target_apr);
    }
    if reward_token_decimals > 18 {
        bail!("reward token decimals out of range: {}", reward_token_decimals);
    }
    if conversion_rate_scaled.is_zero() {
        bail!("conversion rate of zero would require infinite reward tokens");
    }
    if total_staked_wei.is_zero() {
        return Ok(RewardRateResult::zero());
    }

    // APR as an integer basis-point multiplier: floor(apr/100 * 10000).
    let apr_bps = U256::from((target_apr * 100.0).floor() as u64);
    let annual_reward_native_wei = total_staked_wei
        .checked_mul(apr_bps)
        .context("annual native reward overflows 256 bits")?
        / U256::from(BPS_DENOMINATOR);

    let annual_reward_token = annual_reward_native_wei
        .checked_mul(pow10(reward_token_decimals))
        .context("annual token reward overflows 256 bits")?
        / conversion_rate_scaled;

    // Ceiling division: pre-increment the numerator by (divisor - 1).
    let secs = U256::from(SECONDS_PER_YEAR);
    let reward_per_second = annual_reward_token
        .checked_add(secs - U256::from(1u64))
        .context("reward rate numerator overflows 256 bits")?
        / secs;

    Ok(RewardRateResult {
        reward_per_second,
        annual_reward_token,
        annual_reward_native_wei,
    })
}

/// Derive the APR implied by an on-chain reward rate.
///
/// Zero rate or empty pool implies a zero APR, by symmetry with the forward
/// direction. The result is diagnostic only; corrections always recompute
/// through [`calculate_reward_rate`].
pub fn apr_from_reward_rate(
    reward_rate: U256,
    total_staked_wei: U256,
    conversion_rate: f64,
    reward_token_decimals: u8,
) -> Result<AprDiagnosis> {
    if reward_token_decimals > 18 {
        bail!("reward token decimals out of range: {}", reward_token_decimals);
    }
    if reward_rate.is_zero() || total_staked_wei.is_zero() {
        return Ok(AprDiagnosis::zero());
    }

    let conversion_rate_scaled = scale_conversion_rate(conversion_rate)?;

    let annual_reward_token = reward_rate
        .checked_mul(U256::from(SECONDS_PER_YEAR))
        .context("annual token reward overflows 256 bits")?;

    let annual_reward_native_wei = annual_reward_token
        .checked_mul(conversion_rate_scaled)
        .context("annual native reward overflows 256 bits")?
        / pow10(reward_token_decimals);

    let implied_apr =
        u256_to_f64(annual_reward_native_wei) / u256_to_f64(total_staked_wei) * 100.0;

    Ok(AprDiagnosis {
        implied_apr,
        annual_reward_token,
        annual_reward_native_wei,
    })
}
