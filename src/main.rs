//! Command-line entry point for the staking administration toolkit.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use stakewarden::chain::{EvmConnection, EvmStakingContract};
use stakewarden::config::{default_tokens, select_pools, AdjusterConfig, PriceApiConfig};
use stakewarden::math::fixed_point::parse_units;
use stakewarden::pricing::PriceOracle;
use stakewarden::reconcile::{report, ReconcileDriver, ReconcileOptions, RunSummary};

#[derive(Parser)]
#[command(name = "stakewarden")]
#[command(version = "0.1.0")]
#[command(about = "Reward-rate administration for the staking contract", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON-RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "https://rpc.nbcex.com", global = true)]
    rpc_url: String,

    /// Hex private key; required only for --execute
    #[arg(long, env = "PRIVATE_KEY", global = true, hide_env_values = true)]
    private_key: Option<String>,

    /// Deployed staking contract address
    #[arg(
        long,
        env = "STAKING_CONTRACT_ADDRESS",
        default_value = "0x107B4E8F1b849b69033FbF4AAcb10B72d29A16E1",
        global = true
    )]
    staking_contract: String,

    /// Expected total stake, in whole NBC or raw wei
    #[arg(
        long,
        env = "TOTAL_STAKED_NBC",
        default_value = "1000000000000000000000000",
        global = true
    )]
    expected_staked: String,

    /// Target APR percentage
    #[arg(long, env = "TARGET_APR", default_value_t = 100.0, global = true)]
    target_apr: f64,

    /// Minimum reward-rate deviation (percent) worth a transaction
    #[arg(long, default_value_t = 5.0, global = true)]
    threshold: f64,

    /// Exchange ticker access key for the primary price source
    #[arg(long, env = "TICKER_ACCESS_KEY", default_value = "", global = true, hide_env_values = true)]
    ticker_access_key: String,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read pool state and report implied vs. target APR
    Diagnose {
        /// Pool symbol or "all"
        #[arg(long, default_value = "all")]
        pool: String,
    },

    /// Print the correct-rate ladder across candidate stake levels
    Rates {
        /// Pool symbol
        #[arg(long)]
        pool: String,
    },

    /// Compare on-chain reward rates against fresh targets and correct
    /// the ones past the threshold
    Reconcile {
        /// Pool symbol or "all"
        #[arg(long, default_value = "all")]
        pool: String,

        /// Submit transactions instead of printing the plan
        #[arg(long)]
        execute: bool,

        /// Fund for exactly one year regardless of the on-chain duration
        #[arg(long)]
        use_one_year: bool,
    },

    /// Check and repair pool rewards durations
    FixDuration {
        /// Pool symbol or "all"
        #[arg(long, default_value = "all")]
        pool: String,

        /// Submit transactions instead of printing the plan
        #[arg(long)]
        execute: bool,
    },

    /// Withdraw unused reward tokens from a pool to the owner wallet
    Withdraw {
        /// Pool symbol
        #[arg(long)]
        pool: String,

        /// Amount in whole reward tokens
        #[arg(long)]
        amount: String,

        /// Submit the withdrawal instead of previewing it
        #[arg(long)]
        execute: bool,
    },

    /// Run reconcile passes on an interval
    Watch {
        /// Pool symbol or "all"
        #[arg(long, default_value = "all")]
        pool: String,

        /// Seconds between passes
        #[arg(long, default_value_t = 300)]
        interval: u64,

        /// Submit transactions instead of printing plans
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let staking_contract: Address = cli
        .staking_contract
        .parse()
        .context("invalid staking contract address")?;

    let config = AdjusterConfig {
        rpc_url: cli.rpc_url.clone(),
        private_key: cli.private_key.clone(),
        staking_contract,
        expected_staked_wei: AdjusterConfig::parse_staked_amount(&cli.expected_staked)?,
        target_apr: cli.target_apr,
        min_change_threshold_pct: cli.threshold,
        price_api: PriceApiConfig {
            ticker_access_key: cli.ticker_access_key.clone(),
            ..PriceApiConfig::default()
        },
        ..AdjusterConfig::default()
    };
    config.validate()?;

    let conn = Arc::new(EvmConnection::connect(
        &config.rpc_url,
        config.private_key.as_deref(),
    )?);
    let staking = Arc::new(EvmStakingContract::new(conn.clone(), config.staking_contract));
    let oracle = PriceOracle::new(&config.price_api);
    let driver = ReconcileDriver::new(staking, Arc::new(conn), oracle, config.clone())?;

    let tokens = default_tokens();

    match cli.command {
        Commands::Diagnose { pool } => {
            let selected = select_pools(&tokens, &pool)?;
            report::print_run_header("pool diagnosis", driver.config(), false);
            let reviews = driver.diagnose(&selected).await?;
            for review in &reviews {
                report::print_pool_review(review, driver.config());
            }
            if reviews.len() < selected.len() {
                bail!("{} of {} pools failed diagnosis", selected.len() - reviews.len(), selected.len());
            }
        }

        Commands::Rates { pool } => {
            let selected = select_pools(&tokens, &pool)?;
            if selected.len() != 1 {
                bail!("rates needs a single pool symbol, not {:?}", pool);
            }
            let token = &selected[0];
            report::print_run_header("correct-rate ladder", driver.config(), false);
            let (review, rows) = driver.rates_ladder(token).await?;
            report::print_pool_review(&review, driver.config());
            report::print_rates_table(
                token,
                review.conversion.rate,
                driver.config().target_apr,
                &rows,
            );
        }

        Commands::Reconcile { pool, execute, use_one_year } => {
            let selected = select_pools(&tokens, &pool)?;
            let opts = ReconcileOptions { execute, use_one_year };
            report::print_run_header("reward-rate reconciliation", driver.config(), execute);
            let summary = driver.reconcile(&selected, &opts).await?;
            exit_on_failures(&summary)?;
        }

        Commands::FixDuration { pool, execute } => {
            let selected = select_pools(&tokens, &pool)?;
            report::print_run_header("rewards duration check", driver.config(), execute);
            let summary = driver.fix_durations(&selected, execute).await?;
            exit_on_failures(&summary)?;
        }

        Commands::Withdraw { pool, amount, execute } => {
            let selected = select_pools(&tokens, &pool)?;
            if selected.len() != 1 {
                bail!("withdraw needs a single pool symbol, not {:?}", pool);
            }
            let token = &selected[0];
            let amount = parse_units(&amount, token.decimals)?;
            report::print_run_header("reward withdrawal", driver.config(), execute);
            driver.withdraw(token, amount, execute).await?;
        }

        Commands::Watch { pool, interval, execute } => {
            let selected = select_pools(&tokens, &pool)?;
            let opts = ReconcileOptions { execute, use_one_year: false };
            report::print_run_header("periodic reconciliation", driver.config(), execute);
            driver
                .watch(&selected, &opts, Duration::from_secs(interval.max(1)))
                .await?;
        }
    }

    Ok(())
}

fn exit_on_failures(summary: &RunSummary) -> Result<()> {
    if summary.failed > 0 {
        bail!("{} pool(s) failed; see the log above", summary.failed);
    }
    Ok(())
}
