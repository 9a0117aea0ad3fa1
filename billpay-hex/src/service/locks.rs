//! Per-account serialization of balance-affecting operations.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use billpay_types::AccountId;

/// One async mutex per account, created on first use.
///
/// Held from the idempotency check until settlement so two requests for the
/// same account never interleave inside this process.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the account's lock. Released when the guard drops.
    pub async fn acquire(&self, account_id: AccountId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across the await.
        let lock = self.locks.entry(account_id).or_default().clone();
        lock.lock_owned().await
    }

    /// Number of accounts that have taken a lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
