//! Balance guardian and dispatcher behavior against a scripted chain.

mod common;

use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use base_loadgen::{
    Account, AccountLocks, Action, BalanceGuardian, Behavior, ChainError, ContractArtifact,
    DispatchError, HUGE_CALLDATA_MIN_BYTES, IFaucetToken, LoadConfig, TransactionDispatcher,
};
use common::{GAS_PRICE, MockChain, accounts, test_config};

struct Harness {
    chain: Arc<MockChain>,
    locks: AccountLocks,
    funding: Account,
    config: LoadConfig,
}

impl Harness {
    fn new(config: LoadConfig) -> Self {
        let chain = Arc::new(MockChain::default());
        let funding = Account::random();
        let locks = AccountLocks::new();
        chain.watch_funding_lock(funding.address(), locks.clone());
        Self { chain, locks, funding, config }
    }

    fn guardian(&self) -> BalanceGuardian<MockChain> {
        BalanceGuardian::new(
            Arc::clone(&self.chain),
            self.locks.clone(),
            self.funding.clone(),
            &self.config,
        )
    }

    fn dispatcher(&self, receivers: Vec<Address>) -> TransactionDispatcher<MockChain> {
        TransactionDispatcher::new(
            Arc::clone(&self.chain),
            self.guardian(),
            receivers,
            &ContractArtifact::builtin(),
            &self.config,
        )
    }
}

fn token() -> Address {
    Address::repeat_byte(0x70)
}

#[tokio::test(start_paused = true)]
async fn test_guardian_skips_funded_accounts() {
    let harness = Harness::new(test_config(1, 1, 0));
    let guardian = harness.guardian();
    let sender = Account::random();

    assert_eq!(guardian.ensure_sufficient(sender.address()).await.unwrap(), None);
    assert_eq!(guardian.ensure_sufficient(harness.funding.address()).await.unwrap(), None);
    assert!(harness.chain.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_guardian_tops_up_to_target_under_funding_lock() {
    let harness = Harness::new(test_config(1, 1, 0));
    let guardian = harness.guardian();
    let sender = Account::random();
    let balance = harness.config.balance_threshold / U256::from(4);
    harness.chain.set_balance(sender.address(), balance);

    let tx_hash = guardian.ensure_sufficient(sender.address()).await.unwrap();
    assert!(tx_hash.is_some());

    let top_ups = harness.chain.sent_from(harness.funding.address());
    assert_eq!(top_ups.len(), 1);
    assert_eq!(top_ups[0].to, Some(sender.address()));
    assert_eq!(top_ups[0].value, harness.config.top_up_target - balance);
    assert_eq!(harness.chain.balance_of(sender.address()), harness.config.top_up_target);

    assert_eq!(harness.chain.funding_lock_held(), vec![true]);
    assert!(!harness.locks.is_held(harness.funding.address()));
}

#[tokio::test(start_paused = true)]
async fn test_failed_top_up_releases_funding_lock() {
    let harness = Harness::new(test_config(1, 1, 0));
    let guardian = harness.guardian();
    let sender = Account::random();
    harness.chain.set_balance(sender.address(), U256::ZERO);
    harness.chain.reject_sends_from(harness.funding.address());

    let result = guardian.ensure_sufficient(sender.address()).await;
    assert!(matches!(
        result,
        Err(DispatchError::TopUp { account, .. }) if account == sender.address()
    ));
    assert!(!harness.locks.is_held(harness.funding.address()));
}

#[tokio::test(start_paused = true)]
async fn test_native_transfer_is_a_self_transfer() {
    let harness = Harness::new(test_config(1, 1, 0));
    let senders = accounts(3);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());
    let sender = &senders[0];

    let outcome = dispatcher.dispatch(sender, Behavior::NativeTransfer).await.unwrap();
    assert_eq!(outcome.action, Action::NativeTransfer);
    assert_eq!(outcome.receiver, sender.address());
    assert_eq!(outcome.gas_price, GAS_PRICE);
    assert!(outcome.confirmation.is_some());
    assert!(outcome.top_up.is_none());

    let sent = harness.chain.sent_from(sender.address());
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, Some(sender.address()));
    assert_eq!(sent[0].value, harness.config.native_transfer_amount);
    assert_eq!(sent[0].nonce, Some(0));
}

#[tokio::test(start_paused = true)]
async fn test_no_wait_skips_confirmation() {
    let config = LoadConfig { wait_for_confirmation: false, ..test_config(1, 1, 0) };
    let harness = Harness::new(config);
    let senders = accounts(2);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());

    let outcome = dispatcher.dispatch(&senders[0], Behavior::NativeTransfer).await.unwrap();
    assert!(outcome.confirmation.is_none());
    assert_eq!(outcome.gas_price, GAS_PRICE);
}

#[tokio::test(start_paused = true)]
async fn test_token_transfer_mints_from_faucet_first() {
    let config = LoadConfig { token_address: Some(token()), ..test_config(1, 1, 50) };
    let harness = Harness::new(config);
    let senders = accounts(3);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());
    let sender = &senders[0];

    let outcome = dispatcher.dispatch(sender, Behavior::TokenTransfer).await.unwrap();
    assert_eq!(outcome.action, Action::TokenTransfer);
    assert_ne!(outcome.receiver, sender.address());
    assert!(senders.iter().any(|a| a.address() == outcome.receiver));

    let sent = harness.chain.sent_from(sender.address());
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].selector(), Some(IFaucetToken::faucetCall::SELECTOR));
    assert_eq!(sent[1].selector(), Some(IFaucetToken::transferCall::SELECTOR));
    assert!(sent.iter().all(|tx| tx.to == Some(token())));
    assert_eq!((sent[0].nonce, sent[1].nonce), (Some(0), Some(1)));

    let transfer = IFaucetToken::transferCall::abi_decode(&sent[1].input).unwrap();
    assert_eq!(transfer.to, outcome.receiver);
    assert_eq!(transfer.amount, U256::from(10u64).pow(U256::from(18u64)));

    // The faucet is not hit again while the balance covers a transfer.
    dispatcher.dispatch(sender, Behavior::TokenTransfer).await.unwrap();
    let faucets = harness
        .chain
        .sent_from(sender.address())
        .iter()
        .filter(|tx| tx.selector() == Some(IFaucetToken::faucetCall::SELECTOR))
        .count();
    assert_eq!(faucets, 1);
}

#[tokio::test(start_paused = true)]
async fn test_token_transfer_without_token_fails() {
    let harness = Harness::new(test_config(1, 1, 50));
    let senders = accounts(2);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());

    let result = dispatcher.dispatch(&senders[0], Behavior::TokenTransfer).await;
    assert!(matches!(result, Err(DispatchError::TokenNotConfigured)));
}

#[tokio::test(start_paused = true)]
async fn test_low_balance_token_transfer_tops_up_once_even_when_transfer_fails() {
    let config = LoadConfig { token_address: Some(token()), ..test_config(1, 1, 50) };
    let harness = Harness::new(config);
    let senders = accounts(2);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());
    let sender = &senders[0];

    harness.chain.set_balance(sender.address(), U256::ZERO);
    harness.chain.set_token_balance(sender.address(), U256::MAX / U256::from(2));
    harness.chain.reject_sends_from(sender.address());

    let result = dispatcher.dispatch(sender, Behavior::TokenTransfer).await;
    assert!(matches!(result, Err(DispatchError::Chain(ChainError::Rejected { .. }))));

    let funding = harness.funding.address();
    assert_eq!(harness.chain.sent_from(funding).len(), 1);
    assert_eq!(harness.chain.funding_lock_held(), vec![true]);
    assert!(!harness.locks.is_held(funding));
    assert_eq!(harness.chain.balance_of(sender.address()), harness.config.top_up_target);

    // Back above the threshold, so the retry needs no second top-up.
    let _ = dispatcher.dispatch(sender, Behavior::TokenTransfer).await;
    assert_eq!(harness.chain.sent_from(funding).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_complex_ops_deploy_or_send_oversized_calldata() {
    let harness = Harness::new(test_config(1, 1, 100));
    let senders = accounts(3);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());
    let sender = &senders[0];

    for _ in 0..20 {
        let outcome = dispatcher.dispatch(sender, Behavior::ComplexOp).await.unwrap();
        assert!(matches!(outcome.action, Action::ContractDeploy | Action::HugeCalldata));
    }

    let sent = harness.chain.sent_from(sender.address());
    assert_eq!(sent.len(), 20);
    let artifact = ContractArtifact::builtin();
    for tx in &sent {
        if tx.is_create() {
            assert_eq!(tx.input, artifact.bytecode);
        } else {
            assert!(tx.input.len() >= HUGE_CALLDATA_MIN_BYTES);
            assert_ne!(tx.to, Some(sender.address()));
        }
    }
    assert!(sent.iter().any(|tx| tx.is_create()));
    assert!(sent.iter().any(|tx| !tx.is_create()));
}

#[tokio::test(start_paused = true)]
async fn test_receiver_pool_excludes_sender_and_funding() {
    let harness = Harness::new(test_config(1, 1, 50));
    let sender = Account::random();
    let other = Account::random();
    let receivers = vec![sender.address(), harness.funding.address(), other.address()];
    let dispatcher = harness.dispatcher(receivers);

    for _ in 0..10 {
        let outcome = dispatcher.dispatch(&sender, Behavior::ComplexOp).await.unwrap();
        if outcome.action == Action::HugeCalldata {
            assert_eq!(outcome.receiver, other.address());
        }
    }

    let lonely = harness.dispatcher(vec![sender.address(), harness.funding.address()]);
    let result = lonely.dispatch(&sender, Behavior::ComplexOp).await;
    assert!(matches!(
        result,
        Err(DispatchError::NoReceiver { sender: s }) if s == sender.address()
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_abandons_hanging_dispatch() {
    let harness = Harness::new(test_config(1, 1, 0));
    let senders = accounts(2);
    let dispatcher = harness.dispatcher(senders.iter().map(Account::address).collect());
    harness.chain.hang_sends_from(senders[0].address());

    let deadline = Duration::from_millis(300);
    let result =
        dispatcher.dispatch_with_deadline(&senders[0], Behavior::NativeTransfer, deadline).await;
    let error = result.unwrap_err();
    assert!(error.is_timeout());
    assert!(matches!(error, DispatchError::Timeout(d) if d == deadline));
    assert_eq!(harness.chain.overlaps(), 0);

    let outcome = dispatcher
        .dispatch_with_deadline(&senders[1], Behavior::NativeTransfer, deadline)
        .await
        .unwrap();
    assert_eq!(outcome.receiver, senders[1].address());
}
