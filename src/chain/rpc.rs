//! Shared JSON-RPC connection: provider construction, raw `eth_call`
//! reads and signed transaction submission.

use std::sync::Arc;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, info};

use crate::chain::{RewardToken, RewardTokenFactory, TxOutcome};

/// One connection to the chain, shared by every contract client.
///
/// Built read-only when no private key is configured; write paths then
/// fail with an explicit message instead of signing garbage.
pub struct EvmConnection {
    provider: DynProvider,
    signer_address: Option<Address>,
}

impl EvmConnection {
    pub fn connect(rpc_url: &str, private_key: Option<&str>) -> Result<Self> {
        let url: reqwest::Url = rpc_url
            .parse()
            .with_context(|| format!("invalid RPC URL {:?}", rpc_url))?;

        match private_key {
            Some(key) => {
                let signer: PrivateKeySigner = key
                    .trim()
                    .parse()
                    .context("PRIVATE_KEY is not a valid hex private key")?;
                let signer_address = signer.address();
                let provider = ProviderBuilder::new()
                    .wallet(EthereumWallet::from(signer))
                    .connect_http(url)
                    .erased();
                info!("connected to {} as {}", rpc_url, signer_address);
                Ok(Self {
                    provider,
                    signer_address: Some(signer_address),
                })
            }
            None => {
                let provider = ProviderBuilder::new().connect_http(url).erased();
                debug!("connected to {} read-only", rpc_url);
                Ok(Self {
                    provider,
                    signer_address: None,
                })
            }
        }
    }

    /// Address of the configured signer, if any.
    pub fn signer_address(&self) -> Option<Address> {
        self.signer_address
    }

    /// Signer address, or an actionable error for write paths.
    pub fn require_signer(&self) -> Result<Address> {
        self.signer_address
            .ok_or_else(|| anyhow!("no private key configured; set PRIVATE_KEY to execute writes"))
    }

    /// Read-only `eth_call`.
    pub async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let tx = TransactionRequest::default().with_to(to).with_input(data);
        self.provider
            .call(tx)
            .await
            .with_context(|| format!("eth_call to {} failed", to))
    }

    /// Sign, submit and await one transaction. Callers serialize their
    /// writes; this never runs two submissions from the same wallet
    /// concurrently.
    pub async fn send(&self, to: Address, data: Bytes) -> Result<TxOutcome> {
        let from = self.require_signer()?;
        let tx = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(data);

        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .with_context(|| format!("failed to submit transaction to {}", to))?;
        let tx_hash = *pending.tx_hash();
        debug!("submitted {}", tx_hash);

        let receipt = pending
            .get_receipt()
            .await
            .with_context(|| format!("no receipt for transaction {}", tx_hash))?;
        if !receipt.status() {
            bail!("transaction {} reverted", tx_hash);
        }

        info!(
            "confirmed {} in block {}",
            tx_hash,
            receipt
                .block_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "<pending>".to_string())
        );
        Ok(TxOutcome {
            tx_hash,
            block_number: receipt.block_number,
        })
    }
}

impl RewardTokenFactory for Arc<EvmConnection> {
    fn token(&self, address: Address) -> Arc<dyn RewardToken> {
        Arc::new(crate::chain::erc20::EvmRewardToken::new(self.clone(), address))
    }

    fn signer_address(&self) -> Option<Address> {
        EvmConnection::signer_address(self)
    }
}
