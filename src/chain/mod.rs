//! On-chain access: trait seams for the staking contract and its reward
//! tokens, plus the alloy-backed production implementations.
//!
//! The traits exist so the reconciliation driver can be exercised against
//! in-memory fakes; everything that crosses the RPC boundary lives behind
//! them.

pub mod abi;
pub mod erc20;
pub mod rpc;
pub mod staking;

use alloy::primitives::{Address, B256, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::types::{OnChainPoolState, PoolInfo};

pub use erc20::EvmRewardToken;
pub use rpc::EvmConnection;
pub use staking::EvmStakingContract;

/// Outcome of a mined transaction.
#[derive(Debug, Clone)]
pub struct TxOutcome {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Read/write surface of the staking contract.
#[async_trait]
pub trait StakingContract: Send + Sync {
    /// Compact `getPoolInfo` view.
    async fn pool_info(&self, pool_index: u64) -> Result<PoolInfo>;

    /// Detailed `pools` view, including rewards duration and last update.
    async fn pool_detail(&self, pool_index: u64) -> Result<OnChainPoolState>;

    /// Contract owner, the only account allowed to issue corrections.
    async fn owner(&self) -> Result<Address>;

    /// Fund a reward period; the contract derives the per-second rate from
    /// this amount and the configured rewards duration.
    async fn notify_reward_amount(&self, pool_index: u64, reward: U256) -> Result<TxOutcome>;

    /// Reconfigure the reward distribution period.
    async fn set_rewards_duration(&self, pool_index: u64, duration: u64) -> Result<TxOutcome>;

    /// Pull unused reward tokens back out of the contract.
    async fn emergency_withdraw_reward(&self, pool_index: u64, amount: U256) -> Result<TxOutcome>;
}

/// Read/write surface of one ERC-20 reward token.
#[async_trait]
pub trait RewardToken: Send + Sync {
    async fn balance_of(&self, account: Address) -> Result<U256>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;

    async fn approve(&self, spender: Address, amount: U256) -> Result<TxOutcome>;

    /// Owner-only mint, available on the deployment's test tokens.
    async fn mint(&self, to: Address, amount: U256) -> Result<TxOutcome>;

    /// Owner of the token contract, gating `mint`.
    async fn token_owner(&self) -> Result<Address>;
}

/// Hands out a [`RewardToken`] client for a pool's reward token address.
pub trait RewardTokenFactory: Send + Sync {
    fn token(&self, address: Address) -> std::sync::Arc<dyn RewardToken>;

    /// Address the underlying connection signs with, if any.
    fn signer_address(&self) -> Option<Address>;
}
