//! Human-readable reports, printed before any action is taken.

use alloy::primitives::U256;
use chrono::{DateTime, Utc};

use crate::config::{AdjusterConfig, TokenConfig};
use crate::math::fixed_point::format_units;

use super::{CorrectionPlan, DurationAnomaly, PoolReview, PoolVerdict, RunSummary};

const RULE: &str = "--------------------------------------------------------------------------------";

pub fn print_run_header(title: &str, config: &AdjusterConfig, execute: bool) {
    println!("{RULE}");
    println!("  {title}");
    println!("{RULE}");
    println!("staking contract : {}", config.staking_contract);
    println!("rpc              : {}", config.rpc_url);
    println!("target APR       : {}%", config.target_apr);
    println!(
        "expected staked  : {} NBC",
        format_units(config.expected_staked_wei, 18)
    );
    println!(
        "mode             : {}",
        if execute { "execute" } else { "dry run" }
    );
    println!("{RULE}");
}

pub fn print_pool_review(review: &PoolReview, config: &AdjusterConfig) {
    let token = &review.token;
    let decimals = token.decimals;
    println!();
    println!("{} pool (index {})", token.symbol, token.pool_index);
    println!("{RULE}");
    println!(
        "  status            : {}",
        if review.state.active { "active" } else { "inactive" }
    );
    println!(
        "  total staked      : {} NBC",
        format_units(review.state.total_staked_wei, 18)
    );
    println!(
        "  reward rate       : {} {}/s ({} wei/s)",
        format_units(review.state.reward_rate, decimals),
        token.symbol,
        review.state.reward_rate
    );
    println!("  period finish     : {}", format_timestamp(review.state.period_finish));
    println!(
        "  prices            : {} ${} ({}), NBC ${} ({})",
        token.symbol,
        review.reward_quote.usd_price,
        review.reward_quote.source,
        review.native_quote.usd_price,
        review.native_quote.source
    );
    println!(
        "  conversion rate   : 1 {} = {:.2} NBC (scaled {})",
        token.symbol, review.conversion.rate, review.conversion.scaled
    );
    println!("  implied APR       : {:.2}%", review.implied.implied_apr);
    println!(
        "  target rate       : {} {}/s for {}% APR at {} NBC staked",
        format_units(review.target.reward_per_second, decimals),
        token.symbol,
        config.target_apr,
        format_units(config.expected_staked_wei, 18)
    );
    match review.deviation_pct {
        Some(pct) => println!("  rate deviation    : {pct:+.2}%"),
        None => println!("  rate deviation    : n/a (current rate is zero)"),
    }
    if let Some(anomaly) = &review.duration_anomaly {
        println!(
            "  duration anomaly  : {}s ({:.2} years), expected {}s",
            anomaly.actual,
            anomaly.actual_years(),
            anomaly.expected
        );
    }
    println!(
        "  verdict           : {}",
        match review.verdict {
            PoolVerdict::Correct => "correct, no action needed",
            PoolVerdict::NeedsCorrection => "needs correction",
        }
    );
}

pub fn print_correction_plan(plan: &CorrectionPlan, token: &TokenConfig) {
    println!();
    println!("correction plan for {}", plan.symbol);
    println!("{RULE}");
    if let Some(duration) = plan.fix_duration {
        println!("  1. setRewardsDuration({}, {duration})", plan.pool_index);
    }
    println!(
        "  {}. notifyRewardAmount({}, {}) ({} {})",
        if plan.fix_duration.is_some() { 2 } else { 1 },
        plan.pool_index,
        plan.notify_amount,
        format_units(plan.notify_amount, token.decimals),
        token.symbol
    );
    println!(
        "  resulting rate: {} {}/s",
        format_units(plan.reward_per_second, token.decimals),
        token.symbol
    );
}

pub fn print_duration_check(token: &TokenConfig, anomaly: &DurationAnomaly, active: bool) {
    let ok = anomaly.actual == anomaly.expected;
    println!(
        "{} {:<6} pool: {:>12}s = {:>8.2} years{}{}",
        if ok { "ok " } else { "BAD" },
        token.symbol,
        anomaly.actual,
        anomaly.actual_years(),
        if ok { "" } else { " (expected one year)" },
        if active { "" } else { " [inactive]" }
    );
}

pub fn print_withdraw_preview(token: &TokenConfig, info: &crate::types::PoolInfo, amount: U256) {
    println!();
    println!("withdraw from {} pool (index {})", token.symbol, token.pool_index);
    println!("{RULE}");
    println!(
        "  amount        : {} {}",
        format_units(amount, token.decimals),
        token.symbol
    );
    println!(
        "  current rate  : {} {}/s",
        format_units(info.reward_rate, token.decimals),
        token.symbol
    );
    println!("  period finish : {}", format_timestamp(info.period_finish));
}

pub fn print_rates_table(
    token: &TokenConfig,
    conversion_rate: f64,
    target_apr: f64,
    rows: &[(U256, U256, f64)],
) {
    println!();
    println!(
        "{}: correct rate per stake level (target {}% APR, 1 {} = {:.2} NBC)",
        token.symbol, target_apr, token.symbol, conversion_rate
    );
    println!("{RULE}");
    println!(
        "{:>18} NBC | {:>24} {}/s | implied APR of current rate",
        "staked", "correct rate", token.symbol
    );
    for (staked, correct_rate, implied_apr) in rows {
        println!(
            "{:>18} NBC | {:>24} {}/s | {:>14.2}%",
            format_units(*staked, 18),
            format_units(*correct_rate, token.decimals),
            token.symbol,
            implied_apr
        );
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    println!("{RULE}");
    println!(
        "corrected: {}  planned: {}  skipped: {}  failed: {}",
        summary.corrected, summary.planned, summary.skipped, summary.failed
    );
    println!("{RULE}");
}

fn format_timestamp(unix: u64) -> String {
    match DateTime::<Utc>::from_timestamp(unix as i64, 0) {
        Some(dt) => format!("{} ({unix})", dt.format("%Y-%m-%d %H:%M:%S UTC")),
        None => format!("{unix}"),
    }
}
