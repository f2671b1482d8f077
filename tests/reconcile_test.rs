//! Driver-level tests over in-memory chain and price-source fakes: the
//! threshold decision, correction ordering, ownership gating and batch
//! isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy::primitives::{Address, B256, U256};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use nonempty::NonEmpty;

use stakewarden::chain::{RewardToken, RewardTokenFactory, StakingContract, TxOutcome};
use stakewarden::config::{AdjusterConfig, TokenConfig};
use stakewarden::math::fixed_point::scale_conversion_rate;
use stakewarden::math::reward_rate::{calculate_reward_rate, SECONDS_PER_YEAR};
use stakewarden::pricing::{PriceOracle, PriceSource};
use stakewarden::reconcile::{ReconcileDriver, ReconcileOptions};
use stakewarden::types::{OnChainPoolState, PoolInfo};

const BTC_USD: f64 = 93_464.0;
const NBC_USD: f64 = 0.07;

fn signer() -> Address {
    Address::repeat_byte(0x11)
}

fn staking_address() -> Address {
    Address::repeat_byte(0x22)
}

fn btc_token_address() -> Address {
    Address::repeat_byte(0x33)
}

fn wad(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

fn outcome() -> TxOutcome {
    TxOutcome {
        tx_hash: B256::ZERO,
        block_number: Some(1),
    }
}

/// Test pool with an 18-decimal reward token so rates are comfortably
/// large integers.
fn btc_pool() -> TokenConfig {
    TokenConfig {
        symbol: "BTC".to_string(),
        pool_index: 1,
        address: btc_token_address(),
        decimals: 18,
        ticker_symbol: "btcusdt".to_string(),
        coingecko_id: Some("bitcoin".to_string()),
        mintable: true,
    }
}

fn test_config() -> AdjusterConfig {
    AdjusterConfig {
        staking_contract: staking_address(),
        expected_staked_wei: wad(1_000_000),
        target_apr: 100.0,
        min_change_threshold_pct: 5.0,
        private_key: Some("test".to_string()),
        ..AdjusterConfig::default()
    }
}

/// The rate the driver should converge on for the test fixture.
fn correct_rate() -> U256 {
    let scaled = scale_conversion_rate(BTC_USD / NBC_USD).unwrap();
    calculate_reward_rate(100.0, wad(1_000_000), scaled, 18)
        .unwrap()
        .reward_per_second
}

fn pool_state(reward_rate: U256, rewards_duration: u64) -> OnChainPoolState {
    OnChainPoolState {
        reward_token: btc_token_address(),
        total_staked_wei: wad(1_000_000),
        reward_rate,
        period_finish: 1_900_000_000,
        last_update_time: 1_850_000_000,
        rewards_duration,
        active: true,
    }
}

struct MockStaking {
    pools: Mutex<HashMap<u64, OnChainPoolState>>,
    owner: Address,
    failing_pools: Vec<u64>,
    log: Arc<Mutex<Vec<String>>>,
}

impl MockStaking {
    fn new(owner: Address, log: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            owner,
            failing_pools: Vec::new(),
            log,
        }
    }

    fn with_pool(self, index: u64, state: OnChainPoolState) -> Self {
        self.pools.lock().unwrap().insert(index, state);
        self
    }

    fn with_failing_pool(mut self, index: u64) -> Self {
        self.failing_pools.push(index);
        self
    }
}

#[async_trait]
impl StakingContract for MockStaking {
    async fn pool_info(&self, pool_index: u64) -> Result<PoolInfo> {
        let state = self.pool_detail(pool_index).await?;
        Ok(PoolInfo {
            reward_token: state.reward_token,
            total_staked_wei: state.total_staked_wei,
            reward_rate: state.reward_rate,
            period_finish: state.period_finish,
            active: state.active,
        })
    }

    async fn pool_detail(&self, pool_index: u64) -> Result<OnChainPoolState> {
        if self.failing_pools.contains(&pool_index) {
            bail!("provider unreachable for pool {pool_index}");
        }
        self.pools
            .lock()
            .unwrap()
            .get(&pool_index)
            .cloned()
            .ok_or_else(|| anyhow!("no pool {pool_index}"))
    }

    async fn owner(&self) -> Result<Address> {
        Ok(self.owner)
    }

    async fn notify_reward_amount(&self, pool_index: u64, reward: U256) -> Result<TxOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("notify:{pool_index}:{reward}"));
        Ok(outcome())
    }

    async fn set_rewards_duration(&self, pool_index: u64, duration: u64) -> Result<TxOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("set_duration:{pool_index}:{duration}"));
        Ok(outcome())
    }

    async fn emergency_withdraw_reward(&self, pool_index: u64, amount: U256) -> Result<TxOutcome> {
        self.log
            .lock()
            .unwrap()
            .push(format!("withdraw:{pool_index}:{amount}"));
        Ok(outcome())
    }
}

struct MockToken {
    balance: Mutex<U256>,
    allowance: Mutex<U256>,
    owner: Address,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RewardToken for MockToken {
    async fn balance_of(&self, _account: Address) -> Result<U256> {
        Ok(*self.balance.lock().unwrap())
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256> {
        Ok(*self.allowance.lock().unwrap())
    }

    async fn approve(&self, _spender: Address, amount: U256) -> Result<TxOutcome> {
        *self.allowance.lock().unwrap() = amount;
        self.log.lock().unwrap().push(format!("approve:{amount}"));
        Ok(outcome())
    }

    async fn mint(&self, _to: Address, amount: U256) -> Result<TxOutcome> {
        let mut balance = self.balance.lock().unwrap();
        *balance += amount;
        self.log.lock().unwrap().push(format!("mint:{amount}"));
        Ok(outcome())
    }

    async fn token_owner(&self) -> Result<Address> {
        Ok(self.owner)
    }
}

struct MockFactory {
    token: Arc<MockToken>,
    signer: Address,
}

impl RewardTokenFactory for MockFactory {
    fn token(&self, _address: Address) -> Arc<dyn RewardToken> {
        self.token.clone()
    }

    fn signer_address(&self) -> Option<Address> {
        Some(self.signer)
    }
}

/// Fixed prices for the BTC/NBC pair used throughout.
struct FixedPrices;

#[async_trait]
impl PriceSource for FixedPrices {
    fn name(&self) -> &str {
        "fixed-test"
    }

    async fn fetch(&self, token: &TokenConfig) -> Result<f64> {
        match token.symbol.as_str() {
            "BTC" => Ok(BTC_USD),
            "NBC" => Ok(NBC_USD),
            other => Err(anyhow!("no test price for {other}")),
        }
    }
}

fn test_oracle() -> PriceOracle {
    PriceOracle::with_sources(
        NonEmpty::new(Arc::new(FixedPrices) as Arc<dyn PriceSource>),
        1,
    )
}

struct Fixture {
    driver: ReconcileDriver,
    log: Arc<Mutex<Vec<String>>>,
}

fn fixture(staking: MockStaking, token_balance: U256, log: Arc<Mutex<Vec<String>>>) -> Fixture {
    let token = Arc::new(MockToken {
        balance: Mutex::new(token_balance),
        allowance: Mutex::new(U256::ZERO),
        owner: signer(),
        log: log.clone(),
    });
    let factory = Arc::new(MockFactory {
        token,
        signer: signer(),
    });
    let driver = ReconcileDriver::new(Arc::new(staking), factory, test_oracle(), test_config())
        .expect("driver construction");
    Fixture { driver, log }
}

fn log_entries(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn deviation_below_threshold_issues_no_transactions() {
    // Actual rate 4% above correct: within the 5% threshold.
    let correct = correct_rate();
    let actual = correct + correct * U256::from(4u64) / U256::from(100u64);
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(actual, SECONDS_PER_YEAR));
    let fx = fixture(staking, wad(10_000_000), log);

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let summary = fx.driver.reconcile(&[btc_pool()], &opts).await.unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.corrected, 0);
    assert!(log_entries(&fx.log).is_empty(), "no transactions expected");
}

#[tokio::test]
async fn deviation_above_threshold_submits_correction() {
    // Actual rate 6% above correct: past the threshold.
    let correct = correct_rate();
    let actual = correct + correct * U256::from(6u64) / U256::from(100u64);
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(actual, SECONDS_PER_YEAR));
    let fx = fixture(staking, U256::MAX / U256::from(2u64), log);

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let summary = fx.driver.reconcile(&[btc_pool()], &opts).await.unwrap();

    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.failed, 0);

    let entries = log_entries(&fx.log);
    let expected_amount = correct * U256::from(SECONDS_PER_YEAR);
    // Balance was ample: an approve for the deposit, then the funding call.
    assert_eq!(
        entries,
        vec![
            format!("approve:{expected_amount}"),
            format!("notify:1:{expected_amount}"),
        ]
    );
}

#[tokio::test]
async fn dry_run_never_transacts() {
    let correct = correct_rate();
    let actual = correct + correct * U256::from(50u64) / U256::from(100u64);
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(actual, SECONDS_PER_YEAR));
    let fx = fixture(staking, wad(10_000_000), log);

    let summary = fx
        .driver
        .reconcile(&[btc_pool()], &ReconcileOptions::default())
        .await
        .unwrap();

    assert_eq!(summary.planned, 1);
    assert_eq!(summary.corrected, 0);
    assert!(log_entries(&fx.log).is_empty());
}

#[tokio::test]
async fn duration_anomaly_is_fixed_before_funding() {
    // A 56-year duration with an otherwise perfect rate still needs a
    // correction, and the duration fix must land first.
    let correct = correct_rate();
    let bad_duration = 56 * 365 * 24 * 60 * 60;
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(correct, bad_duration));
    let fx = fixture(staking, U256::MAX / U256::from(2u64), log);

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let summary = fx.driver.reconcile(&[btc_pool()], &opts).await.unwrap();

    assert_eq!(summary.corrected, 1);
    let entries = log_entries(&fx.log);
    assert_eq!(
        entries[0],
        format!("set_duration:1:{SECONDS_PER_YEAR}"),
        "duration fix must precede everything else"
    );
    let expected_amount = correct * U256::from(SECONDS_PER_YEAR);
    assert_eq!(*entries.last().unwrap(), format!("notify:1:{expected_amount}"));
}

#[tokio::test]
async fn ownership_mismatch_is_fatal_in_execute_mode() {
    let correct = correct_rate();
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(Address::repeat_byte(0x99), log.clone())
        .with_pool(1, pool_state(correct, SECONDS_PER_YEAR));
    let fx = fixture(staking, wad(10_000_000), log);

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let err = fx
        .driver
        .reconcile(&[btc_pool()], &opts)
        .await
        .expect_err("mismatched owner must abort the run");
    assert!(err.to_string().contains("owner"));
    assert!(log_entries(&fx.log).is_empty());
}

#[tokio::test]
async fn read_only_diagnosis_works_without_ownership() {
    // Diagnosis never touches the owner check or the signer.
    let correct = correct_rate();
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(Address::repeat_byte(0x99), log.clone())
        .with_pool(1, pool_state(correct, SECONDS_PER_YEAR));
    let fx = fixture(staking, U256::ZERO, log);

    let reviews = fx.driver.diagnose(&[btc_pool()]).await.unwrap();
    assert_eq!(reviews.len(), 1);
    assert!(reviews[0].implied.implied_apr > 99.0);
    assert!(reviews[0].implied.implied_apr < 101.0);
}

#[tokio::test]
async fn one_failing_pool_does_not_abort_the_batch() {
    let correct = correct_rate();
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(2, pool_state(correct, SECONDS_PER_YEAR))
        .with_failing_pool(1);
    let fx = fixture(staking, wad(10_000_000), log);

    let mut healthy = btc_pool();
    healthy.pool_index = 2;

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let summary = fx
        .driver
        .reconcile(&[btc_pool(), healthy], &opts)
        .await
        .unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn shortfall_is_minted_before_funding() {
    let correct = correct_rate();
    let actual = correct * U256::from(2u64);
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(actual, SECONDS_PER_YEAR));
    // Wallet starts with nothing; the whole deposit must be minted.
    let fx = fixture(staking, U256::ZERO, log);

    let opts = ReconcileOptions {
        execute: true,
        use_one_year: false,
    };
    let summary = fx.driver.reconcile(&[btc_pool()], &opts).await.unwrap();

    assert_eq!(summary.corrected, 1);
    let expected_amount = correct * U256::from(SECONDS_PER_YEAR);
    assert_eq!(
        log_entries(&fx.log),
        vec![
            format!("mint:{expected_amount}"),
            format!("approve:{expected_amount}"),
            format!("notify:1:{expected_amount}"),
        ]
    );
}

#[tokio::test]
async fn fix_durations_repairs_only_anomalous_pools() {
    let correct = correct_rate();
    let bad_duration = 10 * SECONDS_PER_YEAR;
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(correct, bad_duration))
        .with_pool(2, pool_state(correct, SECONDS_PER_YEAR));
    let fx = fixture(staking, wad(10_000_000), log);

    let mut second = btc_pool();
    second.pool_index = 2;

    let summary = fx
        .driver
        .fix_durations(&[btc_pool(), second], true)
        .await
        .unwrap();

    assert_eq!(summary.corrected, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(
        log_entries(&fx.log),
        vec![format!("set_duration:1:{SECONDS_PER_YEAR}")]
    );
}

#[tokio::test]
async fn withdraw_is_gated_on_execute() {
    let correct = correct_rate();
    let log = Arc::new(Mutex::new(Vec::new()));
    let staking = MockStaking::new(signer(), log.clone())
        .with_pool(1, pool_state(correct, SECONDS_PER_YEAR));
    let fx = fixture(staking, wad(10_000_000), log);

    let amount = wad(270_000);
    fx.driver.withdraw(&btc_pool(), amount, false).await.unwrap();
    assert!(log_entries(&fx.log).is_empty());

    fx.driver.withdraw(&btc_pool(), amount, true).await.unwrap();
    assert_eq!(log_entries(&fx.log), vec![format!("withdraw:1:{amount}")]);
}
