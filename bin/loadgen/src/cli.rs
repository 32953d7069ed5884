//! CLI definition for the load generator binary.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use alloy_primitives::{Address, U256, utils::parse_ether};
use base_loadgen::{
    Account, ContractArtifact, DEFAULT_SUMMARY_PATH, LoadConfig, RetryPolicy, SchedulingMode,
    ServiceConfig, WalletsFile, derive_accounts,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use eyre::{Result, WrapErr, bail};
use url::Url;

use crate::logging::LogArgs;

/// Loadgen - concurrent transaction load generator for EVM networks.
#[derive(Debug, Clone, Parser)]
#[command(name = "loadgen")]
#[command(version, about, long_about = None)]
pub(crate) struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,

    /// Logging configuration arguments.
    #[command(flatten)]
    pub logging: LogArgs,
}

/// Loadgen subcommands.
#[derive(Debug, Clone, Subcommand)]
pub(crate) enum Command {
    /// Serve the HTTP control plane; runs are started and stopped over HTTP.
    Serve(ServeArgs),
    /// Start a single run right away and stop on its duration or on a signal.
    Run(RunArgs),
    /// Create and fund sender accounts, then write the wallets file.
    Setup(SetupArgs),
    /// Print the funding account and its balance.
    Info(ChainArgs),
    /// Deploy the faucet token used by token transfers and print its address.
    DeployToken(DeployTokenArgs),
}

/// Endpoint and key material shared by every subcommand.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Chain")]
pub(crate) struct ChainArgs {
    /// JSON-RPC endpoint of the target chain.
    #[arg(long = "rpc-url", env = "LOADGEN_RPC_URL", value_parser = parse_url)]
    pub rpc_url: Url,

    /// Private key of the funding account (0x-prefixed hex).
    #[arg(long = "funding-key", env = "LOADGEN_FUNDING_KEY", hide_env_values = true)]
    pub funding_key: Option<String>,

    /// BIP-39 mnemonic. Index 0 funds, indices from 1 send.
    #[arg(long = "mnemonic", env = "LOADGEN_MNEMONIC", hide_env_values = true)]
    pub mnemonic: Option<String>,

    /// Retries of a failed RPC query.
    #[arg(long = "rpc-retries", env = "LOADGEN_RPC_RETRIES", default_value_t = 1)]
    pub rpc_retries: usize,

    /// Delay between RPC query retries (e.g. "3s").
    #[arg(
        long = "rpc-retry-delay",
        env = "LOADGEN_RPC_RETRY_DELAY",
        default_value = "3s",
        value_parser = parse_duration
    )]
    pub rpc_retry_delay: Duration,

    /// Deadline of a single RPC query attempt (e.g. "5s").
    #[arg(
        long = "rpc-timeout",
        env = "LOADGEN_RPC_TIMEOUT",
        default_value = "5s",
        value_parser = parse_duration
    )]
    pub rpc_timeout: Duration,
}

impl ChainArgs {
    /// Resolves the funding account from the private key or mnemonic index 0.
    pub(crate) fn funding_account(&self) -> Result<Account> {
        match (&self.funding_key, &self.mnemonic) {
            (Some(key), _) => Account::from_private_key(key).wrap_err("invalid funding key"),
            (None, Some(phrase)) => derive_accounts(phrase, 0, 1)
                .wrap_err("failed to derive funding account")?
                .pop()
                .ok_or_else(|| eyre::eyre!("mnemonic produced no funding account")),
            (None, None) => bail!("either --funding-key or --mnemonic is required"),
        }
    }

    /// RPC query retry policy.
    pub(crate) const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.rpc_retries,
            delay: self.rpc_retry_delay,
            attempt_timeout: self.rpc_timeout,
        }
    }
}

/// Scheduling model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum ModeArg {
    /// Fixed-width slot window, each slot looping its sender.
    #[default]
    Window,
    /// One rotation group per batch.
    Batch,
}

impl From<ModeArg> for SchedulingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Window => Self::Window,
            ModeArg::Batch => Self::Batch,
        }
    }
}

/// Load shape and account selection for runs.
#[derive(Debug, Clone, Args)]
#[command(next_help_heading = "Load")]
pub(crate) struct LoadArgs {
    /// Complexity level 0-100: 0 sends only native transfers, 100 only complex ops.
    #[arg(long, env = "LOADGEN_COMPLEXITY", default_value_t = 20)]
    pub complexity: u8,

    /// Maximum number of transactions in flight.
    #[arg(long, env = "LOADGEN_CONCURRENCY", default_value_t = 15)]
    pub concurrency: usize,

    /// Pause before a sender's next round (e.g. "2s").
    #[arg(
        long = "tx-interval",
        env = "LOADGEN_TX_INTERVAL",
        default_value = "2s",
        value_parser = parse_duration
    )]
    pub tx_interval: Duration,

    /// Deadline of one dispatch, from balance check to confirmation.
    #[arg(
        long = "tx-timeout",
        env = "LOADGEN_TX_TIMEOUT",
        default_value = "60s",
        value_parser = parse_duration
    )]
    pub tx_timeout: Duration,

    /// Number of disjoint sender groups.
    #[arg(long = "rotation-groups", env = "LOADGEN_ROTATION_GROUPS", default_value_t = 4)]
    pub rotation_groups: usize,

    /// Number of loaded accounts to use; all of them when unset.
    #[arg(long = "account-count", env = "LOADGEN_ACCOUNT_COUNT")]
    pub account_count: Option<usize>,

    /// Value of a native transfer, in ether.
    #[arg(
        long = "native-amount",
        env = "LOADGEN_NATIVE_AMOUNT",
        default_value = "0.00001",
        value_parser = parse_ether_amount
    )]
    pub native_amount: U256,

    /// Do not wait for confirmations after submitting.
    #[arg(long = "no-wait", env = "LOADGEN_NO_WAIT")]
    pub no_wait: bool,

    /// Interval between progress reports (e.g. "2s").
    #[arg(
        long = "reporting-interval",
        env = "LOADGEN_REPORTING_INTERVAL",
        default_value = "2s",
        value_parser = parse_duration
    )]
    pub reporting_interval: Duration,

    /// Sender balance below which a top-up is sent, in ether.
    #[arg(
        long = "balance-threshold",
        env = "LOADGEN_BALANCE_THRESHOLD",
        default_value = "0.01",
        value_parser = parse_ether_amount
    )]
    pub balance_threshold: U256,

    /// Balance a topped-up sender is brought back to, in ether.
    #[arg(
        long = "top-up-target",
        env = "LOADGEN_TOP_UP_TARGET",
        default_value = "0.02",
        value_parser = parse_ether_amount
    )]
    pub top_up_target: U256,

    /// Token contract with a public faucet, used by token transfers.
    #[arg(long = "token-address", env = "LOADGEN_TOKEN_ADDRESS", value_parser = parse_address)]
    pub token_address: Option<Address>,

    /// Scheduling model.
    #[arg(long, env = "LOADGEN_MODE", default_value = "window")]
    pub mode: ModeArg,

    /// Hardhat artifact of the contract to deploy; a built-in contract when unset.
    #[arg(long = "deploy-artifact", env = "LOADGEN_DEPLOY_ARTIFACT")]
    pub deploy_artifact: Option<PathBuf>,

    /// Wallets file holding the sender accounts.
    #[arg(long = "wallets", env = "LOADGEN_WALLETS_FILE")]
    pub wallets: Option<PathBuf>,

    /// Sender accounts derived from the mnemonic when no wallets file is given.
    #[arg(long = "mnemonic-accounts", env = "LOADGEN_MNEMONIC_ACCOUNTS", default_value_t = 60)]
    pub mnemonic_accounts: u32,

    /// File run summaries are appended to, one JSON object per line.
    #[arg(
        long = "summary-file",
        env = "LOADGEN_SUMMARY_FILE",
        default_value = DEFAULT_SUMMARY_PATH
    )]
    pub summary_file: PathBuf,
}

impl LoadArgs {
    /// Builds the run configuration.
    pub(crate) fn load_config(
        &self,
        retry: RetryPolicy,
        duration: Option<Duration>,
    ) -> LoadConfig {
        LoadConfig {
            complexity: self.complexity,
            concurrency: self.concurrency,
            tx_interval: self.tx_interval,
            tx_timeout: self.tx_timeout,
            rotation_groups: self.rotation_groups,
            account_count: self.account_count,
            native_transfer_amount: self.native_amount,
            wait_for_confirmation: !self.no_wait,
            reporting_interval: self.reporting_interval,
            balance_threshold: self.balance_threshold,
            top_up_target: self.top_up_target,
            token_address: self.token_address,
            mode: self.mode.into(),
            duration,
            retry,
        }
    }

    /// Loads sender accounts from the wallets file, or derives them from the mnemonic.
    pub(crate) fn sender_accounts(&self, chain: &ChainArgs) -> Result<Vec<Account>> {
        if let Some(path) = &self.wallets {
            return WalletsFile::load(path)
                .and_then(|file| file.accounts())
                .wrap_err_with(|| format!("failed to load wallets from {}", path.display()));
        }
        match &chain.mnemonic {
            Some(phrase) => derive_accounts(phrase, 1, self.mnemonic_accounts)
                .wrap_err("failed to derive sender accounts"),
            None => bail!("no signing accounts: pass --wallets or --mnemonic"),
        }
    }

    /// Loads the deploy artifact, falling back to the built-in contract.
    pub(crate) fn artifact(&self) -> Result<ContractArtifact> {
        match &self.deploy_artifact {
            Some(path) => ContractArtifact::load(path)
                .wrap_err_with(|| format!("failed to load artifact {}", path.display())),
            None => Ok(ContractArtifact::builtin()),
        }
    }

    /// Resolves everything a service needs.
    pub(crate) fn service_config(
        &self,
        chain: &ChainArgs,
        duration: Option<Duration>,
    ) -> Result<ServiceConfig> {
        let load = self.load_config(chain.retry_policy(), duration);
        load.validate().wrap_err("invalid load configuration")?;
        Ok(ServiceConfig {
            rpc_url: chain.rpc_url.clone(),
            funding: chain.funding_account()?,
            accounts: self.sender_accounts(chain)?,
            artifact: self.artifact()?,
            load,
            summary_path: self.summary_file.clone(),
        })
    }
}

/// Arguments of `loadgen serve`.
#[derive(Debug, Clone, Args)]
pub(crate) struct ServeArgs {
    /// Chain arguments.
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Load arguments; runs started over HTTP override some of them.
    #[command(flatten)]
    pub load: LoadArgs,

    /// Address of the control plane.
    #[arg(long = "listen", env = "LOADGEN_LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,
}

/// Arguments of `loadgen run`.
#[derive(Debug, Clone, Args)]
pub(crate) struct RunArgs {
    /// Chain arguments.
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Load arguments.
    #[command(flatten)]
    pub load: LoadArgs,

    /// Stop the run after this long (e.g. "10m"); runs until a signal when unset.
    #[arg(long, env = "LOADGEN_DURATION", value_parser = parse_duration)]
    pub duration: Option<Duration>,
}

/// Arguments of `loadgen setup`.
#[derive(Debug, Clone, Args)]
pub(crate) struct SetupArgs {
    /// Chain arguments.
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Number of sender accounts to create.
    #[arg(long, env = "LOADGEN_SETUP_COUNT", default_value_t = 60)]
    pub count: u32,

    /// Amount each account is funded with, in ether.
    #[arg(
        long = "fund-amount",
        env = "LOADGEN_FUND_AMOUNT",
        default_value = "0.05",
        value_parser = parse_ether_amount
    )]
    pub fund_amount: U256,

    /// Wallets file to write.
    #[arg(long, env = "LOADGEN_WALLETS_FILE", default_value = "wallets.json")]
    pub output: PathBuf,
}

impl SetupArgs {
    /// Derives the accounts from the mnemonic when one is given, else generates fresh keys.
    pub(crate) fn accounts(&self) -> Result<Vec<Account>> {
        match &self.chain.mnemonic {
            Some(phrase) => derive_accounts(phrase, 1, self.count)
                .wrap_err("failed to derive sender accounts"),
            None => Ok((0..self.count).map(|_| Account::random()).collect()),
        }
    }
}

/// Arguments of `loadgen deploy-token`.
#[derive(Debug, Clone, Args)]
pub(crate) struct DeployTokenArgs {
    /// Chain arguments.
    #[command(flatten)]
    pub chain: ChainArgs,

    /// Token artifact JSON; looked up in `--artifacts-dir` when unset.
    #[arg(long = "token-artifact", env = "LOADGEN_TOKEN_ARTIFACT")]
    pub artifact: Option<PathBuf>,

    /// Hardhat artifacts directory.
    #[arg(long = "artifacts-dir", env = "LOADGEN_ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Contract name inside the artifacts directory.
    #[arg(long = "contract", env = "LOADGEN_TOKEN_CONTRACT", default_value = "MockUSDC")]
    pub contract: String,
}

impl DeployTokenArgs {
    /// Path of the token artifact to deploy.
    pub(crate) fn artifact_path(&self) -> PathBuf {
        self.artifact
            .clone()
            .unwrap_or_else(|| ContractArtifact::hardhat_path(&self.artifacts_dir, &self.contract))
    }

    /// Loads the token artifact.
    pub(crate) fn artifact(&self) -> Result<ContractArtifact> {
        let path = self.artifact_path();
        ContractArtifact::load(&path)
            .wrap_err_with(|| format!("failed to load token artifact {}", path.display()))
    }
}

/// Parse a duration string like "12s", "5m", "1h".
fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}

/// Parse a URL string.
fn parse_url(s: &str) -> Result<Url, url::ParseError> {
    Url::parse(s)
}

/// Parse an Ethereum address from hex string.
fn parse_address(s: &str) -> Result<Address, alloy_primitives::hex::FromHexError> {
    s.parse()
}

/// Parse a decimal ether amount into wei.
fn parse_ether_amount(s: &str) -> Result<U256, String> {
    parse_ether(s).map_err(|e| format!("invalid ether amount {s:?}: {e}"))
}
