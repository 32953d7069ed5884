//! Token contract bindings and calldata helpers.

use alloy_primitives::{Address, Bytes, U256};
use alloy_sol_types::SolCall;

use crate::client::ChainError;

alloy_sol_macro::sol! {
    /// Test token with a public faucet.
    interface IFaucetToken {
        /// Returns the token balance of `account`.
        function balanceOf(address account) external view returns (uint256);

        /// Returns the token decimals.
        function decimals() external view returns (uint8);

        /// Transfers `amount` to `to`.
        function transfer(address to, uint256 amount) external returns (bool);

        /// Mints test tokens to `to`.
        function faucet(address to) external;
    }
}

/// Encodes `balanceOf(owner)`.
pub fn encode_balance_of(owner: Address) -> Bytes {
    Bytes::from(IFaucetToken::balanceOfCall { account: owner }.abi_encode())
}

/// Decodes the return data of `balanceOf`.
pub fn decode_balance_of(data: &[u8]) -> Result<U256, ChainError> {
    IFaucetToken::balanceOfCall::abi_decode_returns(data)
        .map_err(|e| ChainError::InvalidResponse(format!("balanceOf: {e}")))
}

/// Encodes `decimals()`.
pub fn encode_decimals() -> Bytes {
    Bytes::from(IFaucetToken::decimalsCall {}.abi_encode())
}

/// Decodes the return data of `decimals`.
pub fn decode_decimals(data: &[u8]) -> Result<u8, ChainError> {
    IFaucetToken::decimalsCall::abi_decode_returns(data)
        .map_err(|e| ChainError::InvalidResponse(format!("decimals: {e}")))
}

/// Encodes `transfer(to, amount)`.
pub fn encode_transfer(to: Address, amount: U256) -> Bytes {
    Bytes::from(IFaucetToken::transferCall { to, amount }.abi_encode())
}

/// Encodes `faucet(to)`.
pub fn encode_faucet(to: Address) -> Bytes {
    Bytes::from(IFaucetToken::faucetCall { to }.abi_encode())
}

/// One whole token in base units.
pub fn token_unit(decimals: u8) -> U256 {
    U256::from(10u64).pow(U256::from(decimals))
}
