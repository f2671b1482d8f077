//! Staking contract client over raw calldata.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::chain::abi::{
    address_at, bool_at, encode_call, u256_at, u64_at, word_from_u256, word_from_u64,
};
use crate::chain::rpc::EvmConnection;
use crate::chain::{StakingContract, TxOutcome};
use crate::types::{OnChainPoolState, PoolInfo};

/// `getPoolInfo(uint256)` returns
/// `(address rewardToken, uint256 totalStakedAmount, uint256 rewardRate,
///   uint256 periodFinish, bool active)`.
const GET_POOL_INFO: &str = "getPoolInfo(uint256)";

/// `pools(uint256)` returns the full storage layout:
/// `(address rewardToken, uint256 totalStakedAmount, uint256 rewardRate,
///   uint256 periodFinish, uint256 lastUpdateTime, uint256 rewardsDuration,
///   uint256 rewardPerTokenStored, bool active)`.
const POOLS: &str = "pools(uint256)";

const OWNER: &str = "owner()";
const NOTIFY_REWARD_AMOUNT: &str = "notifyRewardAmount(uint256,uint256)";
const SET_REWARDS_DURATION: &str = "setRewardsDuration(uint256,uint256)";
const EMERGENCY_WITHDRAW_REWARD: &str = "emergencyWithdrawReward(uint256,uint256)";

pub struct EvmStakingContract {
    conn: Arc<EvmConnection>,
    address: Address,
}

impl EvmStakingContract {
    pub fn new(conn: Arc<EvmConnection>, address: Address) -> Self {
        Self { conn, address }
    }
}

#[async_trait]
impl StakingContract for EvmStakingContract {
    async fn pool_info(&self, pool_index: u64) -> Result<PoolInfo> {
        let data = encode_call(GET_POOL_INFO, &[word_from_u64(pool_index)]);
        let out = self.conn.call(self.address, data).await?;
        Ok(PoolInfo {
            reward_token: address_at(&out, 0)?,
            total_staked_wei: u256_at(&out, 1)?,
            reward_rate: u256_at(&out, 2)?,
            period_finish: u64_at(&out, 3)?,
            active: bool_at(&out, 4)?,
        })
    }

    async fn pool_detail(&self, pool_index: u64) -> Result<OnChainPoolState> {
        let data = encode_call(POOLS, &[word_from_u64(pool_index)]);
        let out = self.conn.call(self.address, data).await?;
        Ok(OnChainPoolState {
            reward_token: address_at(&out, 0)?,
            total_staked_wei: u256_at(&out, 1)?,
            reward_rate: u256_at(&out, 2)?,
            period_finish: u64_at(&out, 3)?,
            last_update_time: u64_at(&out, 4)?,
            rewards_duration: u64_at(&out, 5)?,
            active: bool_at(&out, 7)?,
        })
    }

    async fn owner(&self) -> Result<Address> {
        let out = self.conn.call(self.address, encode_call(OWNER, &[])).await?;
        address_at(&out, 0)
    }

    async fn notify_reward_amount(&self, pool_index: u64, reward: U256) -> Result<TxOutcome> {
        let data = encode_call(
            NOTIFY_REWARD_AMOUNT,
            &[word_from_u64(pool_index), word_from_u256(reward)],
        );
        self.conn.send(self.address, data).await
    }

    async fn set_rewards_duration(&self, pool_index: u64, duration: u64) -> Result<TxOutcome> {
        let data = encode_call(
            SET_REWARDS_DURATION,
            &[word_from_u64(pool_index), word_from_u64(duration)],
        );
        self.conn.send(self.address, data).await
    }

    async fn emergency_withdraw_reward(&self, pool_index: u64, amount: U256) -> Result<TxOutcome> {
        let data = encode_call(
            EMERGENCY_WITHDRAW_REWARD,
            &[word_from_u64(pool_index), word_from_u256(amount)],
        );
        self.conn.send(self.address, data).await
    }
}
