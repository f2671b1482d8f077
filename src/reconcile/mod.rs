//! Reconciliation driver: reads on-chain pool state, recomputes the
//! correct reward parameters from fresh prices, and decides whether a
//! correction transaction is warranted.
//!
//! Each pool moves through Unchecked -> Checked -> Correct or
//! NeedsCorrection. A sub-threshold deviation counts as Correct even when
//! the match is not exact; cosmetic rounding differences are not worth a
//! transaction. A rewards-duration anomaly outranks any rate deviation and
//! is corrected first, because a wrong duration invalidates every rate
//! derived from it.

pub mod report;

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use anyhow::{anyhow, bail, Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tracing::{error, info, warn};

use crate::chain::{RewardTokenFactory, StakingContract};
use crate::config::{native_token, AdjusterConfig, TokenConfig};
use crate::math::fixed_point::{format_units, u256_to_f64};
use crate::math::reward_rate::{apr_from_reward_rate, calculate_reward_rate};
use crate::pricing::PriceOracle;
use crate::types::{
    AprDiagnosis, ConversionRate, OnChainPoolState, PoolParameters, PriceQuote, RewardRateResult,
};

/// Implied APR above this is reported as economically absurd. Deliberately
/// a warning, not a cap: the math stays uncapped.
const ABSURD_APR_PCT: f64 = 10_000.0;

/// Minimum spacing between mutating transactions from one wallet.
const WRITE_PACING: Duration = Duration::from_secs(2);

/// Final classification of a checked pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolVerdict {
    /// On-chain state matches the computed target within the threshold.
    Correct,
    /// Deviation beyond the threshold, or a duration anomaly.
    NeedsCorrection,
}

/// Rewards duration that does not match the configured period.
#[derive(Debug, Clone, Copy)]
pub struct DurationAnomaly {
    pub actual: u64,
    pub expected: u64,
}

impl DurationAnomaly {
    /// Actual duration expressed in years, for the report.
    pub fn actual_years(&self) -> f64 {
        self.actual as f64 / (365.0 * 24.0 * 60.0 * 60.0)
    }
}

/// Everything learned about one pool during a check.
#[derive(Debug, Clone)]
pub struct PoolReview {
    pub token: TokenConfig,
    pub params: PoolParameters,
    pub state: OnChainPoolState,
    pub reward_quote: PriceQuote,
    pub native_quote: PriceQuote,
    pub conversion: ConversionRate,
    /// APR implied by the on-chain rate against the actual stake.
    pub implied: AprDiagnosis,
    /// Freshly computed target for the configured APR and expected stake.
    pub target: RewardRateResult,
    /// Signed relative deviation of the target from the actual rate, in
    /// percent. `None` when the actual rate is zero.
    pub deviation_pct: Option<f64>,
    pub duration_anomaly: Option<DurationAnomaly>,
    pub verdict: PoolVerdict,
}

/// Corrective transactions a NeedsCorrection pool calls for.
#[derive(Debug, Clone)]
pub struct CorrectionPlan {
    pub pool_index: u64,
    pub symbol: String,
    /// Duration to set before funding, when anomalous.
    pub fix_duration: Option<u64>,
    /// Reward deposit for `notifyRewardAmount`; the contract divides this
    /// by the rewards duration to obtain the rate.
    pub notify_amount: U256,
    pub reward_per_second: U256,
}

/// Tally of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunSummary {
    /// Corrections submitted and confirmed
    pub corrected: usize,
    /// Corrections printed in dry-run mode
    pub planned: usize,
    /// Pools already correct, nothing to do
    pub skipped: usize,
    /// Pools whose processing failed
    pub failed: usize,
}

/// Options for a reconcile pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconcileOptions {
    /// Submit transactions instead of printing the plan.
    pub execute: bool,
    /// Fund for exactly one year regardless of the on-chain duration.
    pub use_one_year: bool,
}

pub struct ReconcileDriver {
    staking: Arc<dyn StakingContract>,
    token_factory: Arc<dyn RewardTokenFactory>,
    oracle: PriceOracle,
    config: AdjusterConfig,
    write_limiter: DefaultDirectRateLimiter,
}

impl ReconcileDriver {
    pub fn new(
        staking: Arc<dyn StakingContract>,
        token_factory: Arc<dyn RewardTokenFactory>,
        oracle: PriceOracle,
        config: AdjusterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let quota = Quota::with_period(WRITE_PACING)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
        Ok(Self {
            staking,
            token_factory,
            oracle,
            config,
            write_limiter: RateLimiter::direct(quota),
        })
    }

    pub fn config(&self) -> &AdjusterConfig {
        &self.config
    }

    /// Fetch the native token quote; without it no conversion rate exists
    /// and the whole run is pointless.
    pub async fn native_quote(&self) -> Result<PriceQuote> {
        self.oracle
            .token_price(&native_token())
            .await
            .context("native token price unavailable from every source")
    }

    /// Check one pool: read state, price both legs, compute the implied
    /// APR and the correct target rate, and classify.
    pub async fn review_pool(
        &self,
        token: &TokenConfig,
        native_quote: &PriceQuote,
    ) -> Result<PoolReview> {
        let params = PoolParameters {
            pool_index: token.pool_index,
            reward_token_decimals: token.decimals,
            staked_token_decimals: 18,
            target_apr: self.config.target_apr,
            rewards_duration_secs: self.config.rewards_duration_secs,
        };
        params.validate()?;

        let state = self
            .staking
            .pool_detail(token.pool_index)
            .await
            .with_context(|| format!("failed to read pool {} ({})", token.pool_index, token.symbol))?;

        if state.reward_token != token.address {
            warn!(
                "{} pool reward token {} does not match configured {}",
                token.symbol, state.reward_token, token.address
            );
        }

        let reward_quote = self
            .oracle
            .token_price(token)
            .await
            .with_context(|| format!("no usable {} price from any source", token.symbol))?;

        let conversion =
            ConversionRate::from_prices(reward_quote.usd_price, native_quote.usd_price)?;

        let implied = apr_from_reward_rate(
            state.reward_rate,
            state.total_staked_wei,
            conversion.rate,
            token.decimals,
        )?;
        if implied.implied_apr > ABSURD_APR_PCT {
            warn!(
                "{} implied APR {:.2}% is far beyond any sane target; the stake of {} NBC is tiny relative to the funded rewards",
                token.symbol,
                implied.implied_apr,
                format_units(state.total_staked_wei, 18)
            );
        }

        let target = calculate_reward_rate(
            params.target_apr,
            self.config.expected_staked_wei,
            conversion.scaled,
            params.reward_token_decimals,
        )?;

        let duration_anomaly = (state.rewards_duration != params.rewards_duration_secs)
            .then_some(DurationAnomaly {
                actual: state.rewards_duration,
                expected: params.rewards_duration_secs,
            });

        let deviation_pct = rate_deviation_pct(state.reward_rate, target.reward_per_second);
        let rate_needs_fix = match deviation_pct {
            Some(pct) => pct.abs() >= self.config.min_change_threshold_pct,
            // Zero actual rate against a nonzero target always needs one.
            None => !target.reward_per_second.is_zero(),
        };

        let verdict = if rate_needs_fix || duration_anomaly.is_some() {
            PoolVerdict::NeedsCorrection
        } else {
            PoolVerdict::Correct
        };

        Ok(PoolReview {
            token: token.clone(),
            params,
            state,
            reward_quote,
            native_quote: native_quote.clone(),
            conversion,
            implied,
            target,
            deviation_pct,
            duration_anomaly,
            verdict,
        })
    }

    /// Build the corrective transactions for a NeedsCorrection review.
    pub fn plan_correction(
        &self,
        review: &PoolReview,
        opts: &ReconcileOptions,
    ) -> Result<CorrectionPlan> {
        let fix_duration = review
            .duration_anomaly
            .map(|_| self.config.rewards_duration_secs);

        // The amount funds one full period at the target rate. After a
        // duration fix (or with --use-one-year) that period is the
        // configured one; otherwise whatever the contract currently holds.
        let funding_duration = if opts.use_one_year || fix_duration.is_some() {
            self.config.rewards_duration_secs
        } else {
            review.state.rewards_duration.max(1)
        };

        let notify_amount = review
            .target
            .reward_per_second
            .checked_mul(U256::from(funding_duration))
            .context("reward deposit overflows 256 bits")?;

        Ok(CorrectionPlan {
            pool_index: review.token.pool_index,
            symbol: review.token.symbol.clone(),
            fix_duration,
            notify_amount,
            reward_per_second: review.target.reward_per_second,
        })
    }

    /// Read-only diagnosis across pools. Per-pool failures are isolated.
    pub async fn diagnose(&self, tokens: &[TokenConfig]) -> Result<Vec<PoolReview>> {
        let native_quote = self.native_quote().await?;
        // Warm the cache for the whole batch concurrently; individual
        // failures resurface during the per-pool review.
        self.oracle.token_prices(tokens).await;

        let mut reviews = Vec::with_capacity(tokens.len());
        for token in tokens {
            match self.review_pool(token, &native_quote).await {
                Ok(review) => reviews.push(review),
                Err(err) => error!("{} diagnosis failed: {err:#}", token.symbol),
            }
        }
        Ok(reviews)
    }

    /// Full reconciliation pass. Dry-run by default; `--execute` submits.
    pub async fn reconcile(
        &self,
        tokens: &[TokenConfig],
        opts: &ReconcileOptions,
    ) -> Result<RunSummary> {
        if opts.execute {
            self.assert_contract_ownership().await?;
        }

        let native_quote = self.native_quote().await?;
        self.oracle.token_prices(tokens).await;

        let mut summary = RunSummary::default();
        for token in tokens {
            let review = match self.review_pool(token, &native_quote).await {
                Ok(review) => review,
                Err(err) => {
                    error!("{} check failed: {err:#}", token.symbol);
                    summary.failed += 1;
                    continue;
                }
            };

            report::print_pool_review(&review, &self.config);

            if review.verdict == PoolVerdict::Correct {
                info!("{} within threshold, no action needed", token.symbol);
                summary.skipped += 1;
                continue;
            }

            let plan = match self.plan_correction(&review, opts) {
                Ok(plan) => plan,
                Err(err) => {
                    error!("{} planning failed: {err:#}", token.symbol);
                    summary.failed += 1;
                    continue;
                }
            };
            report::print_correction_plan(&plan, &review.token);

            if !opts.execute {
                info!("dry run; pass --execute to apply the {} correction", plan.symbol);
                summary.planned += 1;
                continue;
            }

            match self.execute_correction(&review, &plan).await {
                Ok(()) => summary.corrected += 1,
                Err(err) => {
                    error!("{} correction failed: {err:#}", token.symbol);
                    summary.failed += 1;
                }
            }
        }

        report::print_summary(&summary);
        Ok(summary)
    }

    /// Apply one pool's correction: duration first, then funding. Mutating
    /// calls are paced and strictly sequential; this wallet never has two
    /// transactions in flight.
    async fn execute_correction(&self, review: &PoolReview, plan: &CorrectionPlan) -> Result<()> {
        let signer = self.signer()?;

        if let Some(duration) = plan.fix_duration {
            self.write_limiter.until_ready().await;
            let outcome = self
                .staking
                .set_rewards_duration(plan.pool_index, duration)
                .await
                .context("setRewardsDuration failed")?;
            info!(
                "{} rewards duration set to {}s in {}",
                plan.symbol, duration, outcome.tx_hash
            );
        }

        if plan.notify_amount.is_zero() {
            info!("{} target rate is zero; nothing to fund", plan.symbol);
            return Ok(());
        }

        // Fund from the live reward token address, not the configured one.
        let token_client = self.token_factory.token(review.state.reward_token);

        let balance = token_client.balance_of(signer).await?;
        if balance < plan.notify_amount {
            let shortfall = plan.notify_amount - balance;
            if !review.token.mintable {
                bail!(
                    "insufficient {} balance: have {}, need {}; deposit more tokens to {}",
                    plan.symbol,
                    format_units(balance, review.token.decimals),
                    format_units(plan.notify_amount, review.token.decimals),
                    signer
                );
            }
            let token_owner = token_client.token_owner().await?;
            if token_owner != signer {
                bail!(
                    "cannot mint {}: token owner is {}, not {}",
                    plan.symbol,
                    token_owner,
                    signer
                );
            }
            self.write_limiter.until_ready().await;
            let outcome = token_client.mint(signer, shortfall).await.context("mint failed")?;
            info!(
                "minted {} {} in {}",
                format_units(shortfall, review.token.decimals),
                plan.symbol,
                outcome.tx_hash
            );
        }

        let allowance = token_client
            .allowance(signer, self.config.staking_contract)
            .await?;
        if allowance < plan.notify_amount {
            self.write_limiter.until_ready().await;
            let outcome = token_client
                .approve(self.config.staking_contract, plan.notify_amount)
                .await
                .context("approve failed")?;
            info!("approved {} spend in {}", plan.symbol, outcome.tx_hash);
        }

        self.write_limiter.until_ready().await;
        let outcome = self
            .staking
            .notify_reward_amount(plan.pool_index, plan.notify_amount)
            .await
            .context("notifyRewardAmount failed")?;
        info!(
            "{} funded with {} ({} per second) in {}",
            plan.symbol,
            format_units(plan.notify_amount, review.token.decimals),
            format_units(plan.reward_per_second, review.token.decimals),
            outcome.tx_hash
        );
        Ok(())
    }

    /// Correct-rate ladder: what the per-second rate should be at each of
    /// several candidate stake levels, and what APR the current on-chain
    /// rate would imply at each. Surfaces the "rate was set for a stake
    /// that never materialized" failure mode.
    pub async fn rates_ladder(
        &self,
        token: &TokenConfig,
    ) -> Result<(PoolReview, Vec<(U256, U256, f64)>)> {
        let native_quote = self.native_quote().await?;
        let review = self.review_pool(token, &native_quote).await?;

        let nbc = U256::from(10u64).pow(U256::from(18u64));
        let mut stakes: Vec<U256> = [1_000_000u64, 100_000, 10_000, 1_000, 100]
            .iter()
            .map(|&n| U256::from(n) * nbc)
            .collect();
        if !review.state.total_staked_wei.is_zero() {
            stakes.push(review.state.total_staked_wei);
        }

        let mut rows = Vec::with_capacity(stakes.len());
        for staked in stakes {
            let correct = calculate_reward_rate(
                self.config.target_apr,
                staked,
                review.conversion.scaled,
                token.decimals,
            )?;
            let implied = apr_from_reward_rate(
                review.state.reward_rate,
                staked,
                review.conversion.rate,
                token.decimals,
            )?;
            rows.push((staked, correct.reward_per_second, implied.implied_apr));
        }
        Ok((review, rows))
    }

    /// Check and repair rewards durations across pools.
    pub async fn fix_durations(&self, tokens: &[TokenConfig], execute: bool) -> Result<RunSummary> {
        if execute {
            self.assert_contract_ownership().await?;
        }

        let expected = self.config.rewards_duration_secs;
        let mut summary = RunSummary::default();
        for token in tokens {
            let state = match self.staking.pool_detail(token.pool_index).await {
                Ok(state) => state,
                Err(err) => {
                    error!("{} duration check failed: {err:#}", token.symbol);
                    summary.failed += 1;
                    continue;
                }
            };

            let anomaly = DurationAnomaly {
                actual: state.rewards_duration,
                expected,
            };
            report::print_duration_check(token, &anomaly, state.active);

            if state.rewards_duration == expected {
                summary.skipped += 1;
                continue;
            }
            if !execute {
                info!("dry run; pass --execute to fix the {} duration", token.symbol);
                summary.planned += 1;
                continue;
            }

            self.write_limiter.until_ready().await;
            match self.staking.set_rewards_duration(token.pool_index, expected).await {
                Ok(outcome) => {
                    info!(
                        "{} rewards duration corrected to {}s in {}",
                        token.symbol, expected, outcome.tx_hash
                    );
                    summary.corrected += 1;
                }
                Err(err) => {
                    error!("{} duration fix failed: {err:#}", token.symbol);
                    summary.failed += 1;
                }
            }
        }

        report::print_summary(&summary);
        Ok(summary)
    }

    /// Withdraw unused rewards from a pool back to the owner wallet.
    pub async fn withdraw(&self, token: &TokenConfig, amount: U256, execute: bool) -> Result<()> {
        let info = self
            .staking
            .pool_info(token.pool_index)
            .await
            .with_context(|| format!("failed to read pool {}", token.symbol))?;
        report::print_withdraw_preview(token, &info, amount);

        if !execute {
            info!("dry run; pass --execute to withdraw from {}", token.symbol);
            return Ok(());
        }

        self.assert_contract_ownership().await?;
        self.write_limiter.until_ready().await;
        let outcome = self
            .staking
            .emergency_withdraw_reward(token.pool_index, amount)
            .await
            .context("emergencyWithdrawReward failed")?;
        info!(
            "withdrew {} {} in {}",
            format_units(amount, token.decimals),
            token.symbol,
            outcome.tx_hash
        );
        Ok(())
    }

    /// Periodic reconciliation. Pass-level errors other than ownership are
    /// logged and the loop keeps going; the threshold check makes repeated
    /// passes idempotent.
    pub async fn watch(
        &self,
        tokens: &[TokenConfig],
        opts: &ReconcileOptions,
        interval: Duration,
    ) -> Result<()> {
        if opts.execute {
            self.assert_contract_ownership().await?;
        }
        loop {
            if let Err(err) = self.reconcile(tokens, opts).await {
                error!("reconcile pass failed: {err:#}");
            }
            info!("next pass in {}s", interval.as_secs());
            tokio::time::sleep(interval).await;
        }
    }

    fn signer(&self) -> Result<alloy::primitives::Address> {
        self.token_factory
            .signer_address()
            .ok_or_else(|| anyhow!("no private key configured; set PRIVATE_KEY to execute writes"))
    }

    /// Writes require the signer to be the contract owner. A mismatch is
    /// fatal for the whole run: every correction would revert anyway.
    async fn assert_contract_ownership(&self) -> Result<()> {
        let signer = self.signer()?;
        let owner = self
            .staking
            .owner()
            .await
            .context("failed to read contract owner")?;
        if owner != signer {
            bail!(
                "wallet {} is not the staking contract owner; use the owner account: {}",
                signer,
                owner
            );
        }
        Ok(())
    }
}

/// Signed relative deviation of the target rate from the actual one, in
/// percent. `None` when the actual rate is zero (no baseline to deviate
/// from).
pub fn rate_deviation_pct(actual: U256, target: U256) -> Option<f64> {
    if actual.is_zero() {
        return None;
    }
    let actual_f = u256_to_f64(actual);
    let target_f = u256_to_f64(target);
    Some((target_f - actual_f) / actual_f * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::reward_rate::SECONDS_PER_YEAR;

    #[test]
    fn deviation_is_signed_and_relative() {
        let pct = rate_deviation_pct(U256::from(100u64), U256::from(104u64)).unwrap();
        assert!((pct - 4.0).abs() < 1e-9);

        let pct = rate_deviation_pct(U256::from(100u64), U256::from(94u64)).unwrap();
        assert!((pct + 6.0).abs() < 1e-9);

        assert!(rate_deviation_pct(U256::ZERO, U256::from(5u64)).is_none());
    }

    #[test]
    fn duration_anomaly_years() {
        let anomaly = DurationAnomaly {
            actual: 56 * 365 * 24 * 60 * 60,
            expected: SECONDS_PER_YEAR,
        };
        assert!((anomaly.actual_years() - 56.0).abs() < 0.01);
    }
}
