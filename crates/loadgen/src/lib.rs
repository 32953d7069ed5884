#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod account;
pub use account::{Account, AccountError, WalletEntry, WalletsFile, derive_accounts};

mod artifacts;
pub use artifacts::{ArtifactError, ContractArtifact};

mod balance;
pub use balance::BalanceGuardian;

mod behavior;
pub use behavior::{Action, Behavior, BehaviorDeck, Weights, plan, plan_counts, sample, weights};

mod client;
pub use client::{
    AlloyChainClient, ChainClient, ChainError, ChainResult, Confirmation, FeeParams, with_retry,
};

mod config;
pub use config::{ConfigError, LoadConfig, RetryPolicy, RunOverrides, SchedulingMode};

mod constants;
pub use constants::*;

mod contracts;
pub use contracts::{
    IFaucetToken, decode_balance_of, decode_decimals, encode_balance_of, encode_decimals,
    encode_faucet, encode_transfer, token_unit,
};

mod controller;
pub use controller::{Controller, RunControl};

mod dispatcher;
pub use dispatcher::{DispatchOutcome, TransactionDispatcher, huge_calldata};

mod error;
pub use error::{ControlError, DispatchError};

mod locks;
pub use locks::{AccountGuard, AccountLocks};

mod metrics;
pub use self::metrics::{
    ACTIVE_SLOTS, GAS_PRICE_GWEI, LABEL_OUTCOME, LABEL_TYPE, MetricSample, MetricsAggregator,
    PENDING_REQUESTS, Spread, StatTag, TRANSACTIONS_TOTAL, TX_DURATION_SECONDS, WindowSummary,
};

mod report;
pub use report::{
    DEFAULT_SUMMARY_PATH, JsonLinesSink, ReportError, RunMetrics, RunParameters, RunSummary,
    SummarySink,
};

mod rotation;
pub use rotation::AccountRotationPool;

mod scheduler;
pub use scheduler::{ConcurrencyScheduler, Submission, select_senders};

mod server;
pub use server::{router, serve};

mod service;
pub use service::{ServiceConfig, run, run_service};

mod setup;
pub use setup::{
    DeployError, Deployment, ProvisionError, ProvisionReport, deploy_token, provision,
    provisioning_cost, token_init_code,
};

mod signal;
pub use signal::setup_signal_handler;

mod state;
pub use state::{Outcome, RunCounters, RunState};

mod window;
pub use window::{Admission, PendingRequest, SlotWindow};
