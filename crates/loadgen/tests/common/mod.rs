#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use base_loadgen::{
    Account, AccountLocks, ChainClient, ChainError, ChainResult, Confirmation, FeeParams,
    IFaucetToken, LoadConfig, ONE_ETHER, RetryPolicy, RunSummary, SummarySink,
};
use parking_lot::Mutex;

pub(crate) const GAS_PRICE: u128 = 2_000_000_000;
pub(crate) const TOKEN_DECIMALS: u8 = 18;

/// A transaction the mock accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SentTx {
    pub(crate) from: Address,
    pub(crate) to: Option<Address>,
    pub(crate) value: U256,
    pub(crate) input: Bytes,
    pub(crate) nonce: Option<u64>,
}

impl SentTx {
    pub(crate) fn selector(&self) -> Option<[u8; 4]> {
        self.input.get(..4).and_then(|s| s.try_into().ok())
    }

    pub(crate) fn is_create(&self) -> bool {
        self.to.is_none()
    }
}

#[derive(Debug, Default)]
struct Ledger {
    balances: HashMap<Address, U256>,
    token_balances: HashMap<Address, U256>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, bool>,
    created: HashMap<TxHash, Address>,
    sent: Vec<SentTx>,
    in_flight: HashSet<Address>,
    funding_lock_held: Vec<bool>,
}

/// Scripted in-memory chain.
///
/// Every account starts with `default_balance` unless scripted otherwise.
/// Sends are delayed by `send_delay` and can be scripted to hang or fail per
/// sender or receiver.
#[derive(Debug)]
pub(crate) struct MockChain {
    ledger: Mutex<Ledger>,
    default_balance: U256,
    send_delay: Duration,
    confirm_delay: Duration,
    hanging: Mutex<HashSet<Address>>,
    failing_from: Mutex<HashSet<Address>>,
    failing_to: Mutex<HashSet<Address>>,
    funding: Mutex<Option<(Address, AccountLocks)>>,
    hashes: AtomicU64,
    active_sends: AtomicUsize,
    peak_sends: AtomicUsize,
    overlaps: AtomicUsize,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(ONE_ETHER, Duration::from_millis(20))
    }
}

impl MockChain {
    pub(crate) fn new(default_balance: U256, send_delay: Duration) -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            default_balance,
            send_delay,
            confirm_delay: Duration::from_millis(5),
            hanging: Mutex::default(),
            failing_from: Mutex::default(),
            failing_to: Mutex::default(),
            funding: Mutex::default(),
            hashes: AtomicU64::new(0),
            active_sends: AtomicUsize::new(0),
            peak_sends: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_balance(&self, address: Address, balance: U256) {
        self.ledger.lock().balances.insert(address, balance);
    }

    pub(crate) fn set_token_balance(&self, address: Address, balance: U256) {
        self.ledger.lock().token_balances.insert(address, balance);
    }

    pub(crate) fn balance_of(&self, address: Address) -> U256 {
        self.ledger.lock().balances.get(&address).copied().unwrap_or(self.default_balance)
    }

    /// Sends from `address` never complete.
    pub(crate) fn hang_sends_from(&self, address: Address) {
        self.hanging.lock().insert(address);
    }

    /// Sends from `address` are rejected by the node.
    pub(crate) fn reject_sends_from(&self, address: Address) {
        self.failing_from.lock().insert(address);
    }

    /// Sends to `address` are rejected by the node.
    pub(crate) fn reject_sends_to(&self, address: Address) {
        self.failing_to.lock().insert(address);
    }

    /// Records whether `locks` holds `funding` whenever the funding account sends.
    pub(crate) fn watch_funding_lock(&self, funding: Address, locks: AccountLocks) {
        *self.funding.lock() = Some((funding, locks));
    }

    pub(crate) fn sent(&self) -> Vec<SentTx> {
        self.ledger.lock().sent.clone()
    }

    pub(crate) fn sent_from(&self, address: Address) -> Vec<SentTx> {
        self.sent().into_iter().filter(|tx| tx.from == address).collect()
    }

    pub(crate) fn senders(&self) -> HashSet<Address> {
        self.sent().into_iter().map(|tx| tx.from).collect()
    }

    pub(crate) fn funding_lock_held(&self) -> Vec<bool> {
        self.ledger.lock().funding_lock_held.clone()
    }

    /// Highest number of sends in progress at once.
    pub(crate) fn peak_sends(&self) -> usize {
        self.peak_sends.load(Ordering::SeqCst)
    }

    /// Number of times two sends for one address were in progress at once.
    pub(crate) fn overlaps(&self) -> usize {
        self.overlaps.load(Ordering::SeqCst)
    }

    fn next_hash(&self) -> TxHash {
        let n = self.hashes.fetch_add(1, Ordering::SeqCst) + 1;
        TxHash::left_padding_from(&n.to_be_bytes())
    }

    fn begin_send(&self, from: Address) {
        let active = self.active_sends.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_sends.fetch_max(active, Ordering::SeqCst);

        let mut ledger = self.ledger.lock();
        if !ledger.in_flight.insert(from) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        if let Some((funding, locks)) = self.funding.lock().as_ref()
            && *funding == from
        {
            ledger.funding_lock_held.push(locks.is_held(from));
        }
    }

    fn end_send(&self, from: Address) {
        self.active_sends.fetch_sub(1, Ordering::SeqCst);
        self.ledger.lock().in_flight.remove(&from);
    }

    fn apply(&self, tx: SentTx) -> ChainResult<TxHash> {
        let mut ledger = self.ledger.lock();
        let from_balance =
            ledger.balances.get(&tx.from).copied().unwrap_or(self.default_balance);
        if from_balance < tx.value {
            return Err(ChainError::Rejected {
                code: -32003,
                message: "insufficient funds for gas * price + value".into(),
            });
        }
        ledger.balances.insert(tx.from, from_balance - tx.value);
        if let Some(to) = tx.to {
            let to_balance = ledger.balances.get(&to).copied().unwrap_or(self.default_balance);
            ledger.balances.insert(to, to_balance + tx.value);
        }

        if tx.selector() == Some(IFaucetToken::faucetCall::SELECTOR)
            && let Ok(call) = IFaucetToken::faucetCall::abi_decode(&tx.input)
        {
            let minted = U256::from(1_000u64) * U256::from(10u64).pow(U256::from(TOKEN_DECIMALS));
            *ledger.token_balances.entry(call.to).or_default() += minted;
        }

        let nonce = ledger.nonces.entry(tx.from).or_default();
        let created = tx.is_create().then(|| tx.from.create(*nonce));
        *nonce += 1;
        let hash = self.next_hash();
        ledger.receipts.insert(hash, true);
        if let Some(address) = created {
            ledger.created.insert(hash, address);
        }
        ledger.sent.push(tx);
        Ok(hash)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn balance(&self, address: Address) -> ChainResult<U256> {
        Ok(self.balance_of(address))
    }

    async fn pending_nonce(&self, address: Address) -> ChainResult<u64> {
        Ok(self.ledger.lock().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn fee_params(&self) -> ChainResult<FeeParams> {
        Ok(FeeParams {
            max_fee_per_gas: GAS_PRICE * 2,
            max_priority_fee_per_gas: 1_000_000,
            gas_price: GAS_PRICE,
        })
    }

    async fn call(&self, tx: TransactionRequest) -> ChainResult<Bytes> {
        let input = tx.input.input().cloned().unwrap_or_default();
        let selector: Option<[u8; 4]> = input.get(..4).and_then(|s| s.try_into().ok());
        match selector {
            Some(s) if s == IFaucetToken::decimalsCall::SELECTOR => {
                Ok(Bytes::from(U256::from(TOKEN_DECIMALS).abi_encode()))
            }
            Some(s) if s == IFaucetToken::balanceOfCall::SELECTOR => {
                let call = IFaucetToken::balanceOfCall::abi_decode(&input)
                    .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;
                let ledger = self.ledger.lock();
                let balance = ledger.token_balances.get(&call.account).copied().unwrap_or_default();
                Ok(Bytes::from(balance.abi_encode()))
            }
            _ => Err(ChainError::Rejected { code: -32000, message: "execution reverted".into() }),
        }
    }

    async fn send_transaction(
        &self,
        from: &Account,
        tx: TransactionRequest,
    ) -> ChainResult<TxHash> {
        let sender = from.address();
        let sent = SentTx {
            from: sender,
            to: tx.to.and_then(|kind| kind.to().copied()),
            value: tx.value.unwrap_or_default(),
            input: tx.input.input().cloned().unwrap_or_default(),
            nonce: tx.nonce,
        };

        self.begin_send(sender);
        let _done = SendGuard { chain: self, from: sender };

        let hangs = self.hanging.lock().contains(&sender);
        if hangs {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.send_delay).await;

        let rejected = self.failing_from.lock().contains(&sender)
            || sent.to.is_some_and(|to| self.failing_to.lock().contains(&to));
        if rejected {
            return Err(ChainError::Rejected { code: -32000, message: "scripted rejection".into() });
        }
        self.apply(sent)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> ChainResult<Confirmation> {
        tokio::time::sleep(self.confirm_delay).await;
        let ledger = self.ledger.lock();
        match ledger.receipts.get(&tx_hash) {
            Some(true) => Ok(Confirmation {
                tx_hash,
                block_number: Some(1),
                gas_used: 21_000,
                effective_gas_price: GAS_PRICE,
                contract_address: ledger.created.get(&tx_hash).copied(),
            }),
            Some(false) => Err(ChainError::Reverted(tx_hash)),
            None => Err(ChainError::InvalidResponse(format!("unknown transaction {tx_hash}"))),
        }
    }
}

/// Marks a send finished even when its future is dropped at a deadline.
struct SendGuard<'a> {
    chain: &'a MockChain,
    from: Address,
}

impl Drop for SendGuard<'_> {
    fn drop(&mut self) {
        self.chain.end_send(self.from);
    }
}

/// Summary sink keeping everything in memory.
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    summaries: Mutex<Vec<RunSummary>>,
}

impl MemorySink {
    pub(crate) fn summaries(&self) -> Vec<RunSummary> {
        self.summaries.lock().clone()
    }
}

impl SummarySink for MemorySink {
    fn write(&self, summary: &RunSummary) -> Result<(), base_loadgen::ReportError> {
        self.summaries.lock().push(summary.clone());
        Ok(())
    }
}

pub(crate) fn accounts(n: usize) -> Vec<Account> {
    (0..n).map(|_| Account::random()).collect()
}

pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        retries: 0,
        delay: Duration::from_millis(10),
        attempt_timeout: Duration::from_secs(1),
    }
}

/// Small, fast run configuration.
pub(crate) fn test_config(concurrency: usize, groups: usize, complexity: u8) -> LoadConfig {
    LoadConfig {
        complexity,
        concurrency,
        rotation_groups: groups,
        tx_interval: Duration::from_millis(50),
        tx_timeout: Duration::from_secs(5),
        reporting_interval: Duration::from_millis(500),
        retry: fast_retry(),
        ..Default::default()
    }
}

/// Polls `condition` on the tokio clock until it holds or `limit` elapses.
pub(crate) async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub(crate) fn shared(chain: MockChain) -> Arc<MockChain> {
    Arc::new(chain)
}
