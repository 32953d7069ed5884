//! Signing accounts and the wallets file.

use std::{fmt, fs, path::Path};

use alloy_primitives::{Address, U256};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or persisting key material.
#[derive(Debug, Error)]
pub enum AccountError {
    /// Reading or writing the wallets file failed.
    #[error("wallets file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The wallets file is not valid JSON.
    #[error("wallets file {path} is malformed: {source}")]
    Malformed {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// A private key could not be parsed.
    #[error("invalid private key for entry {index}: {reason}")]
    InvalidKey {
        /// Position in the wallets file.
        index: usize,
        /// Parser message.
        reason: String,
    },
    /// The stored address does not match the key.
    #[error("entry {index}: address {stored} does not match key address {derived}")]
    AddressMismatch {
        /// Position in the wallets file.
        index: usize,
        /// Address written in the file.
        stored: Address,
        /// Address derived from the key.
        derived: Address,
    },
    /// Mnemonic derivation failed.
    #[error("mnemonic derivation failed at index {index}: {reason}")]
    Derivation {
        /// Derivation index.
        index: u32,
        /// Error message.
        reason: String,
    },
}

/// A signing account.
///
/// The chain-side nonce is never cached; it is re-read before every submission.
#[derive(Clone)]
pub struct Account {
    address: Address,
    signer: PrivateKeySigner,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account").field("address", &self.address).finish_non_exhaustive()
    }
}

impl Account {
    /// Creates an account from a signer.
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { address: signer.address(), signer }
    }

    /// Parses a hex private key, with or without `0x` prefix.
    pub fn from_private_key(key: &str) -> Result<Self, AccountError> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|e| AccountError::InvalidKey { index: 0, reason: format!("{e}") })?;
        Ok(Self::new(signer))
    }

    /// Generates a fresh random account.
    pub fn random() -> Self {
        Self::new(PrivateKeySigner::random())
    }

    /// Returns the account address.
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns the signer.
    pub const fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    /// Returns the hex encoded private key.
    pub fn private_key_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signer.to_bytes()))
    }
}

/// Derives `count` accounts from `phrase` along `m/44'/60'/0'/0/i`, starting at `offset`.
pub fn derive_accounts(
    phrase: &str,
    offset: u32,
    count: u32,
) -> Result<Vec<Account>, AccountError> {
    (offset..offset.saturating_add(count))
        .map(|index| {
            MnemonicBuilder::<English>::default()
                .phrase(phrase)
                .index(index)
                .and_then(|builder| builder.build())
                .map(Account::new)
                .map_err(|e| AccountError::Derivation { index, reason: e.to_string() })
        })
        .collect()
}

/// A single entry of the wallets file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletEntry {
    /// Account address.
    pub address: Address,
    /// Hex encoded private key.
    pub private_key: String,
    /// Balance the account was funded with, in wei.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_balance: Option<U256>,
}

/// On-disk list of provisioned accounts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletsFile {
    /// Provisioned accounts, in derivation order.
    pub wallets: Vec<WalletEntry>,
}

impl WalletsFile {
    /// Builds a wallets file from accounts.
    pub fn from_accounts(accounts: &[Account], initial_balance: Option<U256>) -> Self {
        let wallets = accounts
            .iter()
            .map(|account| WalletEntry {
                address: account.address(),
                private_key: account.private_key_hex(),
                initial_balance,
            })
            .collect();
        Self { wallets }
    }

    /// Reads a wallets file.
    pub fn load(path: &Path) -> Result<Self, AccountError> {
        let display = path.display().to_string();
        let json = fs::read_to_string(path)
            .map_err(|source| AccountError::Io { path: display.clone(), source })?;
        serde_json::from_str(&json)
            .map_err(|source| AccountError::Malformed { path: display, source })
    }

    /// Writes the wallets file as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), AccountError> {
        let display = path.display().to_string();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|source| AccountError::Io { path: display.clone(), source })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|source| AccountError::Malformed { path: display.clone(), source })?;
        fs::write(path, json).map_err(|source| AccountError::Io { path: display, source })
    }

    /// Parses every entry into an [`Account`], checking stored addresses.
    pub fn accounts(&self) -> Result<Vec<Account>, AccountError> {
        self.wallets
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let account = Account::from_private_key(&entry.private_key).map_err(|e| match e {
                    AccountError::InvalidKey { reason, .. } => {
                        AccountError::InvalidKey { index, reason }
                    }
                    other => other,
                })?;
                if account.address() != entry.address {
                    return Err(AccountError::AddressMismatch {
                        index,
                        stored: entry.address,
                        derived: account.address(),
                    });
                }
                Ok(account)
            })
            .collect()
    }
}
