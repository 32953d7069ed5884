//! Chain client error types.

use std::time::Duration;

use alloy_primitives::TxHash;
use alloy_transport::TransportError;
use thiserror::Error;

/// Errors returned by a [`ChainClient`](super::ChainClient).
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Transport error (connection, HTTP, deserialization).
    #[error("transport error: {0}")]
    Transport(String),

    /// The node answered with a JSON-RPC error object.
    #[error("node rejected request ({code}): {message}")]
    Rejected {
        /// JSON-RPC error code.
        code: i64,
        /// Error message returned by the node.
        message: String,
    },

    /// A single attempt exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Building or signing the transaction failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The transaction was included but reverted.
    #[error("transaction {0} reverted")]
    Reverted(TxHash),

    /// The node returned something that could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ChainError {
    /// Returns true if this error is transient and the query should be retried.
    ///
    /// Only transport failures and per-attempt timeouts are retryable. Node
    /// rejections, signing failures and reverts are final.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout(_))
    }
}

impl From<TransportError> for ChainError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => {
                Self::Rejected { code: payload.code, message: payload.message.to_string() }
            }
            None => Self::Transport(err.to_string()),
        }
    }
}

/// Result type alias for chain client operations.
pub type ChainResult<T> = Result<T, ChainError>;
