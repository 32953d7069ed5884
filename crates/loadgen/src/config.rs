//! Configuration types and validation for a load run.

use std::time::Duration;

use alloy_primitives::{Address, U256};
use backon::ConstantBuilder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    DEFAULT_BALANCE_THRESHOLD_WEI, DEFAULT_COMPLEXITY, DEFAULT_CONCURRENCY,
    DEFAULT_NATIVE_TRANSFER_WEI, DEFAULT_REPORTING_INTERVAL, DEFAULT_ROTATION_GROUPS,
    DEFAULT_RPC_ATTEMPT_TIMEOUT, DEFAULT_RPC_RETRIES, DEFAULT_RPC_RETRY_DELAY,
    DEFAULT_TOP_UP_TARGET_WEI, DEFAULT_TX_INTERVAL, DEFAULT_TX_TIMEOUT,
};

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field value is out of the allowed range.
    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange {
        /// The field name that is out of range.
        field: &'static str,
        /// The constraint description.
        constraint: &'static str,
        /// The actual value.
        value: String,
    },
    /// The account pool cannot fill every rotation group.
    #[error(
        "insufficient accounts: {width} slots x {groups} rotation groups needs {required}, have {available}"
    )]
    InsufficientAccounts {
        /// Concurrency width.
        width: usize,
        /// Number of rotation groups.
        groups: usize,
        /// Accounts required.
        required: usize,
        /// Accounts available for sending.
        available: usize,
    },
    /// No signing accounts were loaded.
    #[error("no signing accounts available")]
    NoAccounts,
}

/// How slots are scheduled during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulingMode {
    /// Fixed-width window of slots, each looping its sender until stop.
    #[default]
    Window,
    /// One rotation group per batch, dispatched together and awaited as a whole.
    Batch,
}

impl SchedulingMode {
    /// Returns the mode name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Batch => "batch",
        }
    }
}

impl std::fmt::Display for SchedulingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy for transient RPC query failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt.
    pub retries: usize,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Deadline of a single attempt.
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    /// Creates a `backon` [`ConstantBuilder`] from this policy.
    pub fn to_backoff_builder(&self) -> ConstantBuilder {
        ConstantBuilder::default().with_delay(self.delay).with_max_times(self.retries)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RPC_RETRIES,
            delay: DEFAULT_RPC_RETRY_DELAY,
            attempt_timeout: DEFAULT_RPC_ATTEMPT_TIMEOUT,
        }
    }
}

/// Validated load run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadConfig {
    /// Complexity dial (0-100) controlling the behavior mix.
    pub complexity: u8,
    /// Maximum number of concurrently active slots.
    pub concurrency: usize,
    /// Pause before a slot starts its next round.
    pub tx_interval: Duration,
    /// Deadline of a single dispatch, from balance check to confirmation.
    pub tx_timeout: Duration,
    /// Number of disjoint rotation groups the account pool is split into.
    pub rotation_groups: usize,
    /// Number of loaded accounts to use; `None` uses all of them.
    pub account_count: Option<usize>,
    /// Value sent by a native transfer, in wei.
    pub native_transfer_amount: U256,
    /// Wait for one confirmation after each submission.
    pub wait_for_confirmation: bool,
    /// Interval between progress reports.
    pub reporting_interval: Duration,
    /// Sender balance below which a top-up is sent.
    pub balance_threshold: U256,
    /// Balance a topped-up sender is brought back to.
    pub top_up_target: U256,
    /// Token contract exposing `faucet`, `transfer`, `balanceOf` and `decimals`.
    pub token_address: Option<Address>,
    /// Scheduling model.
    pub mode: SchedulingMode,
    /// Stop the run automatically after this long.
    pub duration: Option<Duration>,
    /// RPC retry policy.
    pub retry: RetryPolicy,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            complexity: DEFAULT_COMPLEXITY,
            concurrency: DEFAULT_CONCURRENCY,
            tx_interval: DEFAULT_TX_INTERVAL,
            tx_timeout: DEFAULT_TX_TIMEOUT,
            rotation_groups: DEFAULT_ROTATION_GROUPS,
            account_count: None,
            native_transfer_amount: DEFAULT_NATIVE_TRANSFER_WEI,
            wait_for_confirmation: true,
            reporting_interval: DEFAULT_REPORTING_INTERVAL,
            balance_threshold: DEFAULT_BALANCE_THRESHOLD_WEI,
            top_up_target: DEFAULT_TOP_UP_TARGET_WEI,
            token_address: None,
            mode: SchedulingMode::default(),
            duration: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl LoadConfig {
    /// Validates field ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.complexity > 100 {
            return Err(ConfigError::OutOfRange {
                field: "complexity",
                constraint: "between 0 and 100",
                value: self.complexity.to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::OutOfRange {
                field: "concurrency",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        if self.rotation_groups == 0 {
            return Err(ConfigError::OutOfRange {
                field: "rotation-groups",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        if self.tx_timeout.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "tx-timeout",
                constraint: "greater than 0",
                value: format!("{:?}", self.tx_timeout),
            });
        }
        if self.reporting_interval.is_zero() {
            return Err(ConfigError::OutOfRange {
                field: "reporting-interval",
                constraint: "greater than 0",
                value: format!("{:?}", self.reporting_interval),
            });
        }
        if self.top_up_target < self.balance_threshold {
            return Err(ConfigError::OutOfRange {
                field: "top-up-target",
                constraint: "at least the balance threshold",
                value: self.top_up_target.to_string(),
            });
        }
        if self.account_count == Some(0) {
            return Err(ConfigError::OutOfRange {
                field: "account-count",
                constraint: "greater than 0",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Number of sender accounts a run with this configuration consumes.
    pub const fn required_accounts(&self) -> usize {
        self.concurrency.saturating_mul(self.rotation_groups)
    }

    /// Returns a copy with the given overrides applied.
    pub fn with_overrides(&self, overrides: &RunOverrides) -> Self {
        let mut config = self.clone();
        if let Some(concurrency) = overrides.concurrency {
            config.concurrency = concurrency;
        }
        if let Some(interval) = overrides.tx_interval {
            config.tx_interval = interval;
        }
        if let Some(complexity) = overrides.complexity {
            config.complexity = complexity;
        }
        if let Some(count) = overrides.account_count {
            config.account_count = Some(count);
        }
        if let Some(groups) = overrides.rotation_groups {
            config.rotation_groups = groups;
        }
        config
    }
}

/// Optional per-run overrides accepted by the control surface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    /// Concurrency width.
    pub concurrency: Option<usize>,
    /// Interval between rounds of a slot.
    pub tx_interval: Option<Duration>,
    /// Complexity level.
    pub complexity: Option<u8>,
    /// Number of accounts to use.
    pub account_count: Option<usize>,
    /// Number of rotation groups.
    pub rotation_groups: Option<usize>,
}
