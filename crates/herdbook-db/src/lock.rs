//! In-process advisory lock table keyed by [`LockKey`].
//!
//! Each key maps to a `tokio` mutex created on first use. A [`LockSet`] is
//! acquired in its iteration order, which is the same total order for every
//! caller, so two units can never wait on each other in a cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use herdbook_core::{LockKey, LockSet};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Guards held by one unit of work. Dropping releases every lock.
#[derive(Debug)]
pub struct HeldLocks {
    guards: Vec<(LockKey, OwnedMutexGuard<()>)>,
}

impl HeldLocks {
    pub fn keys(&self) -> impl Iterator<Item = &LockKey> {
        self.guards.iter().map(|(key, _)| key)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LockTable {
    entries: Arc<Mutex<HashMap<LockKey, Arc<AsyncMutex<()>>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire every key in `locks`, waiting as long as needed. Callers bound
    /// the wait with a timeout; a cancelled acquisition releases whatever it
    /// already holds.
    pub async fn acquire(&self, locks: &LockSet) -> HeldLocks {
        let mut guards = Vec::with_capacity(locks.len());
        for key in locks.iter() {
            let mutex = self.entry(key);
            let guard = mutex.lock_owned().await;
            trace!(?key, "lock acquired");
            guards.push((key.clone(), guard));
        }
        HeldLocks { guards }
    }

    /// Number of keys currently tracked. Idle keys are pruned on access.
    pub fn tracked(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut entries);
        entries.len()
    }

    fn entry(&self, key: &LockKey) -> Arc<AsyncMutex<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Self::prune(&mut entries);
        Arc::clone(
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Drop entries no unit holds or waits on.
    fn prune(entries: &mut HashMap<LockKey, Arc<AsyncMutex<()>>>) {
        entries.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn disjoint_sets_do_not_block() {
        let table = LockTable::new();
        let a = LockSet::new().with(LockKey::Animal(Uuid::from_u128(1)));
        let b = LockSet::new().with(LockKey::Animal(Uuid::from_u128(2)));

        let _held_a = table.acquire(&a).await;
        let held_b = tokio::time::timeout(Duration::from_millis(100), table.acquire(&b)).await;
        assert!(held_b.is_ok());
    }

    #[tokio::test]
    async fn overlapping_sets_wait_for_release() {
        let table = LockTable::new();
        let shared = LockKey::Habitat(Uuid::from_u128(7));
        let first = LockSet::new()
            .with(shared.clone())
            .with(LockKey::Animal(Uuid::from_u128(1)));
        let second = LockSet::new().with(shared);

        let held = table.acquire(&first).await;
        assert_eq!(held.len(), 2);

        let blocked =
            tokio::time::timeout(Duration::from_millis(50), table.acquire(&second)).await;
        assert!(blocked.is_err());

        drop(held);
        let acquired =
            tokio::time::timeout(Duration::from_millis(100), table.acquire(&second)).await;
        assert!(acquired.is_ok());
    }

    #[tokio::test]
    async fn released_keys_are_pruned() {
        let table = LockTable::new();
        let set = LockSet::new().with(LockKey::TagNumber("A-1".into()));
        let held = table.acquire(&set).await;
        assert_eq!(table.tracked(), 1);
        drop(held);
        assert_eq!(table.tracked(), 0);
    }
}
