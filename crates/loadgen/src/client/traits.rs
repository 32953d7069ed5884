//! The chain client seam.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;

use super::ChainResult;
use crate::account::Account;

/// Current fee parameters of the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeeParams {
    /// EIP-1559 max fee per gas, in wei.
    pub max_fee_per_gas: u128,
    /// EIP-1559 priority fee per gas, in wei.
    pub max_priority_fee_per_gas: u128,
    /// Legacy gas price reported by the node, in wei.
    pub gas_price: u128,
}

/// Inclusion details of a confirmed, successful transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    /// Transaction hash.
    pub tx_hash: TxHash,
    /// Block the transaction was included in.
    pub block_number: Option<u64>,
    /// Gas used by the transaction.
    pub gas_used: u64,
    /// Price per gas actually paid, in wei.
    pub effective_gas_price: u128,
    /// Address of the created contract, for deployments.
    pub contract_address: Option<Address>,
}

/// Everything the load generator needs from a chain.
///
/// Query methods are single attempts; callers wrap them in
/// [`with_retry`](super::with_retry). Submissions are never retried.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Returns the balance of `address`, in wei.
    async fn balance(&self, address: Address) -> ChainResult<U256>;

    /// Returns the pending nonce of `address`.
    async fn pending_nonce(&self, address: Address) -> ChainResult<u64>;

    /// Returns the current fee parameters.
    async fn fee_params(&self) -> ChainResult<FeeParams>;

    /// Executes a read-only call and returns the raw return data.
    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes>;

    /// Signs `tx` with `from` and broadcasts it.
    ///
    /// The request carries nonce and fees; a missing gas limit is estimated.
    async fn send_transaction(&self, from: &Account, tx: TransactionRequest)
    -> ChainResult<TxHash>;

    /// Waits for one confirmation of `tx_hash`.
    ///
    /// Returns [`ChainError::Reverted`](super::ChainError::Reverted) if the
    /// transaction was included but failed.
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> ChainResult<Confirmation>;
}
