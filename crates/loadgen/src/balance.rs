//! Sender balance top-ups from the funding account.

use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use alloy_rpc_types_eth::TransactionRequest;
use tracing::{debug, info};

use crate::{
    account::Account,
    client::{ChainClient, ChainResult, with_retry},
    config::{LoadConfig, RetryPolicy},
    constants::NATIVE_TRANSFER_GAS_LIMIT,
    error::DispatchError,
    locks::AccountLocks,
};

/// Keeps senders funded above an operational threshold.
///
/// Top-ups are sent from a single funding account whose nonce is shared by
/// every slot, so each top-up runs under the funding account's lock from the
/// nonce read until the transfer is confirmed.
pub struct BalanceGuardian<C> {
    client: Arc<C>,
    locks: AccountLocks,
    funding: Account,
    threshold: U256,
    target: U256,
    retry: RetryPolicy,
}

impl<C> std::fmt::Debug for BalanceGuardian<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalanceGuardian")
            .field("funding", &self.funding.address())
            .field("threshold", &self.threshold)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl<C: ChainClient> BalanceGuardian<C> {
    /// Creates a guardian funding senders from `funding`.
    pub fn new(
        client: Arc<C>,
        locks: AccountLocks,
        funding: Account,
        config: &LoadConfig,
    ) -> Self {
        Self {
            client,
            locks,
            funding,
            threshold: config.balance_threshold,
            target: config.top_up_target,
            retry: config.retry.clone(),
        }
    }

    /// Address of the funding account.
    pub const fn funding_address(&self) -> Address {
        self.funding.address()
    }

    /// Tops `account` up if its balance is below the threshold.
    ///
    /// Returns the hash of the top-up transaction, or `None` if the balance
    /// was sufficient. The funding account is never topped up from itself.
    pub async fn ensure_sufficient(
        &self,
        account: Address,
    ) -> Result<Option<TxHash>, DispatchError> {
        if account == self.funding.address() {
            return Ok(None);
        }

        let balance = with_retry("balance", &self.retry, || self.client.balance(account)).await?;
        if balance >= self.threshold {
            return Ok(None);
        }

        let shortfall = self.target.saturating_sub(balance);
        debug!(%account, %balance, %shortfall, "Balance below threshold, topping up");

        let _guard = self.locks.acquire(self.funding.address()).await;
        let tx_hash = self
            .top_up(account, shortfall)
            .await
            .map_err(|source| DispatchError::TopUp { account, source })?;

        info!(%account, amount = %shortfall, %tx_hash, "Sender topped up");
        Ok(Some(tx_hash))
    }

    async fn top_up(&self, to: Address, amount: U256) -> ChainResult<TxHash> {
        let from = self.funding.address();
        let nonce =
            with_retry("pending_nonce", &self.retry, || self.client.pending_nonce(from)).await?;
        let fees = with_retry("fee_params", &self.retry, || self.client.fee_params()).await?;

        let tx = TransactionRequest::default()
            .to(to)
            .value(amount)
            .nonce(nonce)
            .gas_limit(NATIVE_TRANSFER_GAS_LIMIT)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

        let tx_hash = self.client.send_transaction(&self.funding, tx).await?;
        self.client.wait_for_confirmation(tx_hash).await?;
        Ok(tx_hash)
    }
}
