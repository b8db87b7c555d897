// SPDX-FileCopyrightText: 2026 Spendgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user serialization of pre-authorization.
//!
//! A plain `pre_authorize` reads spend, decides, and returns; the caller
//! commits the spend later. Two concurrent calls for one user can both pass
//! against the same stale total. Holding a [`SpendPermit`] from the check
//! until the spend is recorded closes that window for the user.

use std::sync::Arc;

use dashmap::DashMap;
use spendgate_core::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<UserId, Arc<Mutex<()>>>;

/// One async mutex per user, created on first use and removed when the last
/// permit or waiter for that user goes away.
#[derive(Debug, Default)]
pub(crate) struct UserLocks {
    locks: Arc<LockMap>,
}

impl UserLocks {
    /// Wait for exclusive access to `user`.
    pub(crate) async fn acquire(&self, user: UserId) -> SpendPermit {
        // The map shard guard is released before awaiting the user lock.
        let lock = self.locks.entry(user).or_default().clone();
        let guard = lock.lock_owned().await;
        SpendPermit {
            user,
            held: Some(HeldLock {
                guard,
                locks: self.locks.clone(),
            }),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

/// Proof that a pre-authorization ran under the user's lock.
///
/// Dropping the permit releases the lock. A permit issued while per-user
/// serialization is disabled holds nothing.
#[derive(Debug)]
#[must_use = "dropping the permit releases the user's spend lock"]
pub struct SpendPermit {
    user: UserId,
    held: Option<HeldLock>,
}

#[derive(Debug)]
struct HeldLock {
    guard: OwnedMutexGuard<()>,
    locks: Arc<LockMap>,
}

impl SpendPermit {
    pub(crate) fn unlocked(user: UserId) -> Self {
        Self { user, held: None }
    }

    /// The user this permit was issued for.
    pub fn user(&self) -> UserId {
        self.user
    }

    /// Whether the permit holds the user's lock.
    pub fn is_exclusive(&self) -> bool {
        self.held.is_some()
    }

    /// Release the lock. Equivalent to dropping the permit.
    pub fn release(self) {}
}

impl Drop for SpendPermit {
    fn drop(&mut self) {
        if let Some(HeldLock { guard, locks }) = self.held.take() {
            // The guard owns a handle to the mutex; drop it before counting.
            drop(guard);
            // `remove_if` holds the shard lock, so a concurrent `acquire`
            // either cloned the mutex first (count > 1) or creates a new one.
            locks.remove_if(&self.user, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}
