//! [`ChainClient`] backed by an alloy HTTP provider.

use alloy_eips::Encodable2718;
use alloy_network::{Ethereum, EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{PendingTransactionBuilder, Provider, RootProvider};
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;
use tokio::sync::OnceCell;
use url::Url;

use super::{ChainClient, ChainError, ChainResult, Confirmation, FeeParams};
use crate::{
    account::Account,
    constants::{
        GAS_LIMIT_MULTIPLIER_DENOMINATOR, GAS_LIMIT_MULTIPLIER_NUMERATOR, REQUIRED_CONFIRMATIONS,
    },
};

/// Applies a 120% safety margin to a gas estimate using integer arithmetic.
const fn apply_gas_margin(estimated: u64) -> u64 {
    estimated.saturating_mul(GAS_LIMIT_MULTIPLIER_NUMERATOR) / GAS_LIMIT_MULTIPLIER_DENOMINATOR
}

/// Chain client talking JSON-RPC over HTTP.
///
/// Transactions are signed locally with the sending account's key and
/// broadcast as raw EIP-2718 envelopes.
pub struct AlloyChainClient {
    provider: RootProvider,
    chain_id: OnceCell<u64>,
}

impl std::fmt::Debug for AlloyChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlloyChainClient")
            .field("chain_id", &self.chain_id.get())
            .finish_non_exhaustive()
    }
}

impl AlloyChainClient {
    /// Creates a client for the given RPC endpoint.
    pub fn new(rpc_url: Url) -> Self {
        Self { provider: RootProvider::new_http(rpc_url), chain_id: OnceCell::new() }
    }

    /// Returns the chain id, fetching it once.
    pub async fn chain_id(&self) -> ChainResult<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                self.provider.get_chain_id().await.map_err(ChainError::from)
            })
            .await
            .copied()
    }
}

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn fee_params(&self) -> ChainResult<FeeParams> {
        let fees = self.provider.estimate_eip1559_fees().await?;
        let gas_price = self.provider.get_gas_price().await?;
        Ok(FeeParams {
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            gas_price,
        })
    }

    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        Ok(self.provider.call(tx).await?)
    }

    async fn send_transaction(
        &self,
        from: &Account,
        tx: TransactionRequest,
    ) -> ChainResult<TxHash> {
        let mut tx = tx.from(from.address());
        if tx.chain_id.is_none() {
            tx.set_chain_id(self.chain_id().await?);
        }
        if tx.gas.is_none() {
            let estimate = self.provider.estimate_gas(tx.clone()).await?;
            tx.set_gas_limit(apply_gas_margin(estimate));
        }

        let wallet = EthereumWallet::from(from.signer().clone());
        let envelope = <TransactionRequest as TransactionBuilder<Ethereum>>::build(tx, &wallet)
            .await
            .map_err(|e| ChainError::Signing(e.to_string()))?;

        let pending = self.provider.send_raw_transaction(&envelope.encoded_2718()).await?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> ChainResult<Confirmation> {
        let receipt = PendingTransactionBuilder::new(self.provider.clone(), tx_hash)
            .with_required_confirmations(REQUIRED_CONFIRMATIONS)
            .get_receipt()
            .await
            .map_err(|e| ChainError::Transport(format!("waiting for {tx_hash}: {e}")))?;

        if !receipt.status() {
            return Err(ChainError::Reverted(tx_hash));
        }

        Ok(Confirmation {
            tx_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            contract_address: receipt.contract_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_gas_margin() {
        assert_eq!(apply_gas_margin(21_000), 25_200);
        assert_eq!(apply_gas_margin(0), 0);
        assert_eq!(apply_gas_margin(u64::MAX), u64::MAX / GAS_LIMIT_MULTIPLIER_DENOMINATOR);
    }

    #[test]
    fn test_debug_before_chain_id_is_known() {
        let client = AlloyChainClient::new("http://localhost:8545".parse().unwrap());
        assert!(format!("{client:?}").contains("chain_id: None"));
    }
}
