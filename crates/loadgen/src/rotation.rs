//! Round-robin rotation over disjoint account groups.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::{account::Account, config::ConfigError};

/// Fixed partition of the sender accounts into equally sized groups.
///
/// Membership is decided once at construction and never changes. Groups are
/// handed out in order and wrap around after the last one.
#[derive(Debug)]
pub struct AccountRotationPool {
    groups: Vec<Vec<Account>>,
    cursor: AtomicUsize,
}

impl AccountRotationPool {
    /// Partitions `accounts` into `groups` groups of `width` accounts.
    ///
    /// Accounts beyond `width * groups` are left out of the rotation.
    pub fn new(accounts: &[Account], width: usize, groups: usize) -> Result<Self, ConfigError> {
        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts);
        }
        let required = width.saturating_mul(groups);
        if width == 0 || groups == 0 || accounts.len() < required {
            return Err(ConfigError::InsufficientAccounts {
                width,
                groups,
                required,
                available: accounts.len(),
            });
        }

        let groups = accounts[..required].chunks(width).map(<[Account]>::to_vec).collect();
        Ok(Self { groups, cursor: AtomicUsize::new(0) })
    }

    /// Returns the next group in round-robin order.
    pub fn next_group(&self) -> &[Account] {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.groups.len();
        &self.groups[index]
    }

    /// Number of groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Accounts per group.
    pub fn width(&self) -> usize {
        self.groups.first().map_or(0, Vec::len)
    }

    /// Every account taking part in the rotation.
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.groups.iter().flatten()
    }
}
