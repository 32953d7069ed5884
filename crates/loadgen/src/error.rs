//! Error types for dispatching and run control.

use std::time::Duration;

use alloy_primitives::Address;
use thiserror::Error;

use crate::{client::ChainError, config::ConfigError};

/// Failure of a single dispatch attempt.
///
/// Never fatal to the run; the scheduler counts it and moves on.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A chain query, submission or confirmation failed.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Topping up the sender from the funding account failed.
    #[error("balance top-up of {account} failed: {source}")]
    TopUp {
        /// Account that needed funds.
        account: Address,
        /// Underlying failure.
        #[source]
        source: ChainError,
    },

    /// The receiver pool holds no account other than the sender.
    #[error("no eligible receiver for sender {sender}")]
    NoReceiver {
        /// The sender.
        sender: Address,
    },

    /// A token transfer was drawn but no token contract is configured.
    #[error("token transfer requested but no token contract is configured")]
    TokenNotConfigured,

    /// The attempt did not finish within the per-transaction deadline.
    #[error("dispatch timed out after {0:?}")]
    Timeout(Duration),
}

impl DispatchError {
    /// Returns true if the attempt was abandoned at its deadline.
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// JSON-RPC error code reported by the node, if any.
    pub const fn code(&self) -> Option<i64> {
        match self {
            Self::Chain(ChainError::Rejected { code, .. })
            | Self::TopUp { source: ChainError::Rejected { code, .. }, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Rejection from the run control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A run is already active or still draining.
    #[error("Simulation is already running")]
    AlreadyRunning,

    /// No run is active.
    #[error("No simulation is running")]
    NotRunning,

    /// The effective configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
