//! Chain access: the [`ChainClient`] seam, its alloy implementation and query retries.

mod alloy;
mod error;
mod retry;
mod traits;

pub use alloy::AlloyChainClient;
pub use error::{ChainError, ChainResult};
pub use retry::with_retry;
pub use traits::{ChainClient, Confirmation, FeeParams};
