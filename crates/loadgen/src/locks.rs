//! Per-address mutual exclusion.

use std::sync::Arc;

use alloy_primitives::Address;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per account address.
///
/// At most one balance-affecting operation per address runs at a time. The
/// returned guard releases the address when dropped, including on early
/// return or cancellation of the owning task.
#[derive(Debug, Default, Clone)]
pub struct AccountLocks {
    locks: Arc<DashMap<Address, Arc<Mutex<()>>>>,
}

/// Exclusive hold on one address.
#[derive(Debug)]
pub struct AccountGuard {
    address: Address,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    /// The locked address.
    pub const fn address(&self) -> Address {
        self.address
    }
}

impl AccountLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, address: Address) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.entry(address).or_default().value())
    }

    /// Waits until `address` is free and takes it.
    pub async fn acquire(&self, address: Address) -> AccountGuard {
        let lock = self.lock_for(address);
        let guard = lock.lock_owned().await;
        tracing::trace!(%address, "Account lock acquired");
        AccountGuard { address, _guard: guard }
    }

    /// Takes `address` if it is free.
    pub fn try_acquire(&self, address: Address) -> Option<AccountGuard> {
        let lock = self.lock_for(address);
        lock.try_lock_owned().ok().map(|guard| AccountGuard { address, _guard: guard })
    }

    /// Returns true if `address` is currently held.
    pub fn is_held(&self, address: Address) -> bool {
        self.locks.get(&address).is_some_and(|lock| lock.try_lock().is_err())
    }
}
