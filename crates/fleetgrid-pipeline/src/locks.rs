//! Per-target version-change locks.
//!
//! A target is locked to at most one in-flight version change at a time;
//! a second run touching an already-locked target queues behind the
//! first rather than racing it. Locks are acquired in sorted id order so
//! two runs over overlapping fleets cannot deadlock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use fleetgrid_state::TargetId;

/// Registry of per-target locks.
#[derive(Default)]
pub struct TargetLocks {
    inner: Mutex<HashMap<TargetId, Arc<Mutex<()>>>>,
}

/// Holds a set of target locks; dropping it releases them all.
pub struct TargetLockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl TargetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire locks for all given targets, waiting for any holder to
    /// release first. Duplicate ids are collapsed.
    pub async fn acquire(&self, targets: &[TargetId]) -> TargetLockGuard {
        let mut ids: Vec<TargetId> = targets.to_vec();
        ids.sort();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            let lock = {
                let mut map = self.inner.lock().await;
                map.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
            };
            guards.push(lock.lock_owned().await);
        }
        TargetLockGuard { _guards: guards }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_acquire_queues_behind_first() {
        let locks = Arc::new(TargetLocks::new());
        let ids = vec!["edge-07".to_string(), "edge-08".to_string()];

        let guard = locks.acquire(&ids).await;

        let contender = {
            let locks = locks.clone();
            let ids = ids.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&ids).await;
            })
        };

        // The contender cannot get the lock while the first holds it.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn disjoint_fleets_do_not_block() {
        let locks = Arc::new(TargetLocks::new());

        let _a = locks.acquire(&["edge-01".to_string()]).await;
        // A different target acquires immediately.
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&["edge-02".to_string()]),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn duplicate_ids_are_collapsed() {
        let locks = TargetLocks::new();
        let ids = vec!["edge-01".to_string(), "edge-01".to_string()];
        // Would deadlock against itself if duplicates were locked twice.
        let _guard = locks.acquire(&ids).await;
    }

    #[tokio::test]
    async fn overlapping_sets_queue_in_sorted_order() {
        let locks = Arc::new(TargetLocks::new());

        let guard = locks
            .acquire(&["a".to_string(), "b".to_string()])
            .await;

        // Overlaps on "b": must wait even though "c" is free.
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&["c".to_string(), "b".to_string()]).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .expect("contender should acquire after release")
            .unwrap();
    }
}
