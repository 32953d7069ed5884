//! One-off preparation ahead of a run: funding sender accounts and deploying
//! the faucet token used by token transfers.

use alloy_network::TransactionBuilder;
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_sol_types::SolValue;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    account::{Account, WalletEntry, WalletsFile},
    artifacts::ContractArtifact,
    client::{ChainClient, ChainError, ChainResult, with_retry},
    config::RetryPolicy,
    constants::NATIVE_TRANSFER_GAS_LIMIT,
};

/// Failure that prevents provisioning from starting.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Reading the funding balance or fees failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The funding account cannot cover every top-up and its gas.
    #[error("funding account {funding} holds {available} wei, provisioning needs {required} wei")]
    InsufficientFunds {
        /// Funding account.
        funding: Address,
        /// Wei needed for the whole plan.
        required: U256,
        /// Wei held by the funding account.
        available: U256,
    },
}

/// Result of a provisioning pass.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// Accounts that were funded, with the funding transaction.
    pub funded: Vec<(Address, TxHash)>,
    /// Accounts that could not be funded, with the reason.
    pub failed: Vec<(Address, String)>,
    /// Every account, with its initial balance when funding succeeded.
    pub wallets: WalletsFile,
}

/// Wei a provisioning plan needs: `amount` per account plus the worst-case
/// transfer fee at `max_fee_per_gas`.
pub fn provisioning_cost(accounts: usize, amount: U256, max_fee_per_gas: u128) -> U256 {
    let fee = U256::from(max_fee_per_gas).saturating_mul(U256::from(NATIVE_TRANSFER_GAS_LIMIT));
    amount.saturating_add(fee).saturating_mul(U256::from(accounts))
}

/// Funds each of `accounts` with `amount` from `funding`.
///
/// Transfers go out one at a time, each waiting for its confirmation before
/// the next nonce is read. A failed transfer is logged and skipped. Nothing is
/// sent when the funding balance cannot cover the whole plan.
pub async fn provision<C: ChainClient>(
    client: &C,
    funding: &Account,
    accounts: &[Account],
    amount: U256,
    retry: &RetryPolicy,
) -> Result<ProvisionReport, ProvisionError> {
    let from = funding.address();
    let available = with_retry("balance", retry, || client.balance(from)).await?;
    let fees = with_retry("fee_params", retry, || client.fee_params()).await?;

    let required = provisioning_cost(accounts.len(), amount, fees.max_fee_per_gas);
    if available < required {
        return Err(ProvisionError::InsufficientFunds { funding: from, required, available });
    }
    info!(
        funding = %from,
        %available,
        %required,
        accounts = accounts.len(),
        "Provisioning accounts"
    );

    let mut funded = Vec::new();
    let mut failed = Vec::new();
    let mut wallets = Vec::with_capacity(accounts.len());

    for (index, account) in accounts.iter().enumerate() {
        let to = account.address();
        let initial_balance = match fund(client, funding, to, amount, retry).await {
            Ok(tx_hash) => {
                info!(index, account = %to, %tx_hash, "Account funded");
                funded.push((to, tx_hash));
                Some(amount)
            }
            Err(e) => {
                warn!(index, account = %to, error = %e, "Funding failed, skipping account");
                failed.push((to, e.to_string()));
                None
            }
        };
        wallets.push(WalletEntry {
            address: to,
            private_key: account.private_key_hex(),
            initial_balance,
        });
    }

    Ok(ProvisionReport { funded, failed, wallets: WalletsFile { wallets } })
}

async fn fund<C: ChainClient>(
    client: &C,
    funding: &Account,
    to: Address,
    amount: U256,
    retry: &RetryPolicy,
) -> ChainResult<TxHash> {
    let from = funding.address();
    let nonce = with_retry("pending_nonce", retry, || client.pending_nonce(from)).await?;
    let fees = with_retry("fee_params", retry, || client.fee_params()).await?;

    let tx = TransactionRequest::default()
        .to(to)
        .value(amount)
        .nonce(nonce)
        .gas_limit(NATIVE_TRANSFER_GAS_LIMIT)
        .max_fee_per_gas(fees.max_fee_per_gas)
        .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

    let tx_hash = client.send_transaction(funding, tx).await?;
    client.wait_for_confirmation(tx_hash).await?;
    Ok(tx_hash)
}

/// Failure to deploy the faucet token.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Submitting or confirming the deployment failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The constructor takes parameters other than a single owner address.
    #[error("unsupported constructor parameters: ({0})")]
    UnsupportedConstructor(String),

    /// The receipt of the deployment names no created contract.
    #[error("deployment {0} created no contract")]
    NoContractAddress(TxHash),
}

/// A confirmed contract deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    /// Address of the created contract.
    pub address: Address,
    /// Deploying account.
    pub deployer: Address,
    /// Hash of the creation transaction.
    pub tx_hash: TxHash,
}

/// Creation code of `artifact` with its constructor arguments appended.
///
/// A constructor taking one `address` receives `owner`; a constructor without
/// parameters receives nothing.
pub fn token_init_code(artifact: &ContractArtifact, owner: Address) -> Result<Bytes, DeployError> {
    let mut code = artifact.bytecode.to_vec();
    match artifact.constructor_inputs().as_slice() {
        [] => {}
        ["address"] => code.extend_from_slice(&owner.abi_encode()),
        other => return Err(DeployError::UnsupportedConstructor(other.join(","))),
    }
    Ok(Bytes::from(code))
}

/// Deploys the token of `artifact` from `funding`, which becomes its owner,
/// and waits for the deployment to be confirmed.
pub async fn deploy_token<C: ChainClient>(
    client: &C,
    funding: &Account,
    artifact: &ContractArtifact,
    retry: &RetryPolicy,
) -> Result<Deployment, DeployError> {
    let deployer = funding.address();
    let code = token_init_code(artifact, deployer)?;
    let nonce = with_retry("pending_nonce", retry, || client.pending_nonce(deployer)).await?;
    let fees = with_retry("fee_params", retry, || client.fee_params()).await?;

    let tx = TransactionRequest::default()
        .into_create()
        .input(TransactionInput::new(code))
        .nonce(nonce)
        .max_fee_per_gas(fees.max_fee_per_gas)
        .max_priority_fee_per_gas(fees.max_priority_fee_per_gas);

    let tx_hash = client.send_transaction(funding, tx).await?;
    info!(
        %deployer,
        %tx_hash,
        contract = artifact.contract_name.as_deref().unwrap_or("unnamed"),
        "Token deployment submitted"
    );
    let confirmation = client.wait_for_confirmation(tx_hash).await?;
    let address = confirmation.contract_address.ok_or(DeployError::NoContractAddress(tx_hash))?;

    info!(%address, %deployer, %tx_hash, "Token deployed");
    Ok(Deployment { address, deployer, tx_hash })
}
