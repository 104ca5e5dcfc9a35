//! Per-item mutual exclusion for the stock mutation engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use stockledger_core::ItemId;

/// Registry of per-item async locks.
///
/// Holding the guard serializes the read-validate-write sequence for one item
/// within this process; different items never block each other.
#[derive(Debug, Default)]
pub struct ItemLocks {
    locks: Mutex<HashMap<ItemId, Arc<AsyncMutex<()>>>>,
}

/// Idle entries are swept once the registry grows past this size.
const SWEEP_THRESHOLD: usize = 1024;

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `item_id`.
    pub async fn lock(&self, item_id: ItemId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if locks.len() >= SWEEP_THRESHOLD {
                // Only the registry holds an idle lock.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            locks.entry(item_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of tracked items.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_item_is_exclusive() {
        let locks = Arc::new(ItemLocks::new());
        let guard = locks.lock(ItemId::new(1)).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(ItemId::new(1)).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_items_do_not_block() {
        let locks = ItemLocks::new();
        let _a = locks.lock(ItemId::new(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(ItemId::new(2))).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn idle_locks_are_swept() {
        let locks = ItemLocks::new();
        for id in 0..SWEEP_THRESHOLD as i64 {
            drop(locks.lock(ItemId::new(id)).await);
        }
        assert_eq!(locks.len(), SWEEP_THRESHOLD);

        let _held = locks.lock(ItemId::new(-1)).await;
        assert_eq!(locks.len(), 1);
    }
}
