//! ERC-20 reward token client.

use std::sync::Arc;

use alloy::primitives::{Address, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::chain::abi::{address_at, encode_call, u256_at, word_from_address, word_from_u256};
use crate::chain::rpc::EvmConnection;
use crate::chain::{RewardToken, TxOutcome};

pub struct EvmRewardToken {
    conn: Arc<EvmConnection>,
    address: Address,
}

impl EvmRewardToken {
    pub fn new(conn: Arc<EvmConnection>, address: Address) -> Self {
        Self { conn, address }
    }
}

#[async_trait]
impl RewardToken for EvmRewardToken {
    async fn balance_of(&self, account: Address) -> Result<U256> {
        let data = encode_call("balanceOf(address)", &[word_from_address(account)]);
        let out = self.conn.call(self.address, data).await?;
        u256_at(&out, 0)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        let data = encode_call(
            "allowance(address,address)",
            &[word_from_address(owner), word_from_address(spender)],
        );
        let out = self.conn.call(self.address, data).await?;
        u256_at(&out, 0)
    }

    async fn approve(&self, spender: Address, amount: U256) -> Result<TxOutcome> {
        let data = encode_call(
            "approve(address,uint256)",
            &[word_from_address(spender), word_from_u256(amount)],
        );
        self.conn.send(self.address, data).await
    }

    async fn mint(&self, to: Address, amount: U256) -> Result<TxOutcome> {
        let data = encode_call(
            "mint(address,uint256)",
            &[word_from_address(to), word_from_u256(amount)],
        );
        self.conn.send(self.address, data).await
    }

    async fn token_owner(&self) -> Result<Address> {
        let out = self.conn.call(self.address, encode_call("owner()", &[])).await?;
        address_at(&out, 0)
    }
}
