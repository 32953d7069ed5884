//! Executes one chain action per dispatch.

use std::{sync::Arc, time::Duration};

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use rand::{Rng, seq::IteratorRandom};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::{
    account::Account,
    artifacts::ContractArtifact,
    balance::BalanceGuardian,
    behavior::{Action, Behavior},
    client::{ChainClient, Confirmation, with_retry},
    config::{LoadConfig, RetryPolicy},
    constants::{HUGE_CALLDATA_MAX_BYTES, HUGE_CALLDATA_MIN_BYTES, NATIVE_TRANSFER_GAS_LIMIT},
    contracts,
    error::DispatchError,
};

/// Generates a random payload sized uniformly in the oversized calldata range.
pub fn huge_calldata<R: Rng + ?Sized>(rng: &mut R) -> Bytes {
    let len = rng.random_range(HUGE_CALLDATA_MIN_BYTES..HUGE_CALLDATA_MAX_BYTES);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    Bytes::from(data)
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Action the behavior resolved to.
    pub action: Action,
    /// Receiver of the transaction; the sender itself for native transfers.
    pub receiver: Address,
    /// Hash of the main transaction.
    pub tx_hash: TxHash,
    /// Price per gas: the effective price when confirmed, the node's gas price otherwise.
    pub gas_price: u128,
    /// Inclusion details, when confirmation was awaited.
    pub confirmation: Option<Confirmation>,
    /// Hash of the balance top-up sent before the action, if any.
    pub top_up: Option<TxHash>,
}

/// Executes exactly one chain action for a sender and behavior.
///
/// Nonces and fees are read fresh for every transaction. Chain failures are
/// never retried here; only read queries go through the retry policy.
pub struct TransactionDispatcher<C> {
    client: Arc<C>,
    guardian: BalanceGuardian<C>,
    receivers: Vec<Address>,
    native_amount: U256,
    wait_for_confirmation: bool,
    token: Option<Address>,
    token_decimals: OnceCell<u8>,
    deploy_code: Bytes,
    retry: RetryPolicy,
}

impl<C> std::fmt::Debug for TransactionDispatcher<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionDispatcher")
            .field("receivers", &self.receivers.len())
            .field("token", &self.token)
            .field("wait_for_confirmation", &self.wait_for_confirmation)
            .finish_non_exhaustive()
    }
}

impl<C: ChainClient> TransactionDispatcher<C> {
    /// Creates a dispatcher drawing receivers from `receivers`.
    ///
    /// The guardian's funding account is removed from the receiver pool.
    pub fn new(
        client: Arc<C>,
        guardian: BalanceGuardian<C>,
        receivers: Vec<Address>,
        artifact: &ContractArtifact,
        config: &LoadConfig,
    ) -> Self {
        let funding = guardian.funding_address();
        let receivers = receivers.into_iter().filter(|a| *a != funding).collect();
        Self {
            client,
            guardian,
            receivers,
            native_amount: config.native_transfer_amount,
            wait_for_confirmation: config.wait_for_confirmation,
            token: config.token_address,
            token_decimals: OnceCell::new(),
            deploy_code: artifact.bytecode.clone(),
            retry: config.retry.clone(),
        }
    }

    /// The balance guardian used before every dispatch.
    pub const fn guardian(&self) -> &BalanceGuardian<C> {
        &self.guardian
    }

    /// Dispatches under a deadline.
    ///
    /// When the deadline elapses the in-flight work is dropped, which cancels
    /// any pending RPC call. A transaction that was already broadcast may
    /// still be included without being observed.
    pub async fn dispatch_with_deadline(
        &self,
        sender: &Account,
        behavior: Behavior,
        deadline: Duration,
    ) -> Result<DispatchOutcome, DispatchError> {
        match tokio::time::timeout(deadline, self.dispatch(sender, behavior)).await {
            Ok(result) => result,
            Err(_) => {
                let error = DispatchError::Timeout(deadline);
                warn!(
                    sender = %sender.address(),
                    %behavior,
                    error = %error,
                    is_timeout = true,
                    "Dispatch abandoned"
                );
                Err(error)
            }
        }
    }

    /// Dispatches one action for `sender`.
    ///
    /// Failures are logged with sender, receiver and behavior before being
    /// returned.
    pub async fn dispatch(
        &self,
        sender: &Account,
        behavior: Behavior,
    ) -> Result<DispatchOutcome, DispatchError> {
        let action = Action::resolve(behavior, &mut rand::rng());
        let receiver = match behavior {
            Behavior::NativeTransfer => Ok(sender.address()),
            _ => self.pick_receiver(sender.address()),
        };

        let picked = receiver.as_ref().ok().copied();
        let result = match receiver {
            Ok(receiver) => self.execute(sender, action, receiver).await,
            Err(e) => Err(e),
        };

        if let Err(error) = &result {
            warn!(
                sender = %sender.address(),
                receiver = ?picked,
                %behavior,
                %action,
                error = %error,
                code = ?error.code(),
                is_timeout = false,
                "Dispatch failed"
            );
        }
        result
    }

    fn pick_receiver(&self, sender: Address) -> Result<Address, DispatchError> {
        self.receivers
            .iter()
            .filter(|a| **a != sender)
            .choose(&mut rand::rng())
            .copied()
            .ok_or(DispatchError::NoReceiver { sender })
    }

    async fn execute(
        &self,
        sender: &Account,
        action: Action,
        receiver: Address,
    ) -> Result<DispatchOutcome, DispatchError> {
        let top_up = self.guardian.ensure_sufficient(sender.address()).await?;

        let tx = match action {
            Action::NativeTransfer => TransactionRequest::default()
                .to(receiver)
                .value(self.native_amount)
                .gas_limit(NATIVE_TRANSFER_GAS_LIMIT),
            Action::TokenTransfer => {
                let token = self.token.ok_or(DispatchError::TokenNotConfigured)?;
                let unit = contracts::token_unit(self.token_decimals(token).await?);
                self.ensure_token_balance(sender, token, unit).await?;
                TransactionRequest::default()
                    .to(token)
                    .input(TransactionInput::new(contracts::encode_transfer(receiver, unit)))
            }
            Action::ContractDeploy => TransactionRequest::default()
                .into_create()
                .input(TransactionInput::new(self.deploy_code.clone())),
            Action::HugeCalldata => TransactionRequest::default()
                .to(receiver)
                .input(TransactionInput::new(huge_calldata(&mut rand::rng()))),
        };

        let (tx_hash, fees) = self.submit(sender, tx).await?;
        debug!(sender = %sender.address(), %receiver, %action, %tx_hash, "Transaction submitted");

        let confirmation = if self.wait_for_confirmation {
            Some(self.client.wait_for_confirmation(tx_hash).await?)
        } else {
            None
        };

        Ok(DispatchOutcome {
            action,
            receiver,
            tx_hash,
            gas_price: confirmation.map_or(fees.gas_price, |c| c.effective_gas_price),
            confirmation,
            top_up,
        })
    }

    /// Fills nonce and fees from fresh reads and broadcasts `tx`.
    async fn submit(
        &self,
        sender: &Account,
        tx: TransactionRequest,
    ) -> Result<(TxHash, crate::client::FeeParams), DispatchError> {
        let from = sender.address();
        let nonce =
            with_retry("pending_nonce", &self.retry, || self.client.pending_nonce(from)).await?;
        let fees = with_retry("fee_params", &self.retry, || self.client.fee_params()).await?;

        let tx = tx
            .nonce(nonce)
            .max_fee_per_gas(fees.max_fee_per_gas)
            .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);
        let tx_hash = self.client.send_transaction(sender, tx).await?;
        Ok((tx_hash, fees))
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, DispatchError> {
        let decimals = self
            .token_decimals
            .get_or_try_init(|| async {
                let call = TransactionRequest::default()
                    .to(token)
                    .input(TransactionInput::new(contracts::encode_decimals()));
                let data =
                    with_retry("decimals", &self.retry, || self.client.call(call.clone())).await?;
                contracts::decode_decimals(&data)
            })
            .await?;
        Ok(*decimals)
    }

    /// Mints from the token faucet and waits for it when the sender holds less than `amount`.
    async fn ensure_token_balance(
        &self,
        sender: &Account,
        token: Address,
        amount: U256,
    ) -> Result<(), DispatchError> {
        let call = TransactionRequest::default()
            .to(token)
            .input(TransactionInput::new(contracts::encode_balance_of(sender.address())));
        let data = with_retry("balance_of", &self.retry, || self.client.call(call.clone())).await?;
        let balance = contracts::decode_balance_of(&data)?;
        if balance >= amount {
            return Ok(());
        }

        let faucet = TransactionRequest::default()
            .to(token)
            .input(TransactionInput::new(contracts::encode_faucet(sender.address())));
        let (tx_hash, _) = self.submit(sender, faucet).await?;
        self.client.wait_for_confirmation(tx_hash).await?;
        debug!(sender = %sender.address(), %tx_hash, "Token faucet confirmed");
        Ok(())
    }
}
