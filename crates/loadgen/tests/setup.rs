//! Provisioning of sender accounts from the funding account.

mod common;

use std::time::Duration;

use alloy_primitives::{Bytes, U256};
use base_loadgen::{
    Account, ChainError, ContractArtifact, DeployError, ONE_ETHER, ProvisionError, WalletsFile,
    deploy_token, provision, provisioning_cost,
};
use common::{GAS_PRICE, MockChain, accounts, fast_retry};

fn amount() -> U256 {
    ONE_ETHER / U256::from(20)
}

#[tokio::test(start_paused = true)]
async fn test_provision_funds_every_account_in_order() {
    let chain = MockChain::new(ONE_ETHER, Duration::from_millis(10));
    let funding = Account::random();
    let targets = accounts(3);
    for account in &targets {
        chain.set_balance(account.address(), U256::ZERO);
    }

    let report = provision(&chain, &funding, &targets, amount(), &fast_retry()).await.unwrap();

    assert_eq!(report.funded.len(), 3);
    assert!(report.failed.is_empty());
    assert_eq!(report.wallets.wallets.len(), 3);
    for (entry, account) in report.wallets.wallets.iter().zip(&targets) {
        assert_eq!(entry.address, account.address());
        assert_eq!(entry.initial_balance, Some(amount()));
        assert_eq!(chain.balance_of(account.address()), amount());
    }

    let nonces: Vec<_> =
        chain.sent_from(funding.address()).iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![Some(0), Some(1), Some(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_provision_skips_failed_transfers() {
    let chain = MockChain::new(ONE_ETHER, Duration::from_millis(10));
    let funding = Account::random();
    let targets = accounts(3);
    chain.reject_sends_to(targets[1].address());

    let report = provision(&chain, &funding, &targets, amount(), &fast_retry()).await.unwrap();

    assert_eq!(report.funded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, targets[1].address());
    assert_eq!(report.wallets.wallets[1].initial_balance, None);
    assert_eq!(report.wallets.wallets[2].initial_balance, Some(amount()));

    // Every entry, funded or not, can be loaded back as a signing account.
    let loaded = report.wallets.accounts().unwrap();
    assert_eq!(loaded.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_provision_refuses_when_funding_cannot_cover_the_plan() {
    let funding = Account::random();
    let targets = accounts(4);
    let required = provisioning_cost(targets.len(), amount(), GAS_PRICE * 2);
    let chain = MockChain::new(ONE_ETHER, Duration::from_millis(10));
    chain.set_balance(funding.address(), required - U256::from(1));

    let result = provision(&chain, &funding, &targets, amount(), &fast_retry()).await;
    match result {
        Err(ProvisionError::InsufficientFunds { funding: f, required: r, available }) => {
            assert_eq!(f, funding.address());
            assert_eq!(r, required);
            assert_eq!(available, required - U256::from(1));
        }
        other => panic!("expected insufficient funds, got {other:?}"),
    }
    assert!(chain.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_provisioned_wallets_survive_a_save_and_load() {
    let chain = MockChain::new(ONE_ETHER, Duration::from_millis(10));
    let funding = Account::random();
    let targets = accounts(2);
    let report = provision(&chain, &funding, &targets, amount(), &fast_retry()).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wallets.json");
    report.wallets.save(&path).unwrap();

    let loaded = WalletsFile::load(&path).unwrap();
    assert_eq!(loaded, report.wallets);
    let addresses: Vec<_> = loaded.accounts().unwrap().iter().map(Account::address).collect();
    assert_eq!(addresses, targets.iter().map(Account::address).collect::<Vec<_>>());
}

fn token_artifact() -> ContractArtifact {
    ContractArtifact {
        contract_name: Some("MockUSDC".to_string()),
        abi: serde_json::json!([
            {"type": "constructor", "inputs": [{"name": "initialOwner", "type": "address"}]}
        ]),
        bytecode: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52]),
    }
}

#[tokio::test(start_paused = true)]
async fn test_deploy_token_creates_contract_owned_by_funding() {
    let chain = MockChain::default();
    let funding = Account::random();
    let artifact = token_artifact();

    let deployment = deploy_token(&chain, &funding, &artifact, &fast_retry()).await.unwrap();

    assert_eq!(deployment.deployer, funding.address());
    assert_eq!(deployment.address, funding.address().create(0));

    let sent = chain.sent_from(funding.address());
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_create());
    assert_eq!(sent[0].nonce, Some(0));
    assert_eq!(&sent[0].input[..5], artifact.bytecode.as_ref());
    assert_eq!(&sent[0].input[5 + 12..], funding.address().as_slice());
}

#[tokio::test(start_paused = true)]
async fn test_deploy_token_surfaces_rejected_deployment() {
    let chain = MockChain::default();
    let funding = Account::random();
    chain.reject_sends_from(funding.address());

    let result = deploy_token(&chain, &funding, &token_artifact(), &fast_retry()).await;
    assert!(matches!(result, Err(DeployError::Chain(ChainError::Rejected { .. }))));
}
