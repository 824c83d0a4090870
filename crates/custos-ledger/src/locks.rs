// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-item reader/writer locks.
//
// Writers (custody appends, lifecycle changes, audited decryption) on one
// evidence item are serialized; verification takes the shared side so it
// never observes a half-applied operation. Different items never contend.
//
// Handles are only cloned out under the table mutex, so a lock whose `Arc`
// is held by the table alone is idle and can be dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use custos_core::types::EvidenceId;
use tracing::trace;

/// Handle to one item's lock. Clone it out of the table, then lock it.
pub type ItemLock = Arc<RwLock<()>>;

/// Table size at which idle locks are swept before inserting another.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug)]
pub struct ItemLocks {
    table: Mutex<HashMap<EvidenceId, ItemLock>>,
    prune_threshold: usize,
}

impl Default for ItemLocks {
    fn default() -> Self {
        Self::with_prune_threshold(PRUNE_THRESHOLD)
    }
}

impl ItemLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            prune_threshold,
        }
    }

    /// The lock for `evidence_id`, created on first use.
    ///
    /// The table holds at most `prune_threshold` idle locks plus those in use.
    pub fn handle(&self, evidence_id: &EvidenceId) -> ItemLock {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(evidence_id) {
            return Arc::clone(lock);
        }
        if table.len() >= self.prune_threshold {
            let before = table.len();
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            trace!(pruned = before - table.len(), "idle item locks dropped");
        }
        Arc::clone(table.entry(*evidence_id).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_item_shares_a_lock() {
        let locks = ItemLocks::new();
        let id = EvidenceId::new();
        assert!(Arc::ptr_eq(&locks.handle(&id), &locks.handle(&id)));
    }

    #[test]
    fn different_items_do_not_contend() {
        let locks = ItemLocks::new();
        let a = locks.handle(&EvidenceId::new());
        let b = locks.handle(&EvidenceId::new());

        let _held = a.write().unwrap();
        assert!(b.try_write().is_ok());
        assert!(a.try_read().is_err());
    }

    #[test]
    fn idle_locks_are_pruned() {
        let locks = ItemLocks::with_prune_threshold(4);
        for _ in 0..100 {
            drop(locks.handle(&EvidenceId::new()));
        }
        assert!(locks.len() <= 5, "table grew to {}", locks.len());
    }

    #[test]
    fn held_locks_survive_pruning() {
        let locks = ItemLocks::with_prune_threshold(2);
        let id = EvidenceId::new();
        let held = locks.handle(&id);
        let _guard = held.write().unwrap();

        for _ in 0..10 {
            drop(locks.handle(&EvidenceId::new()));
        }
        assert!(Arc::ptr_eq(&held, &locks.handle(&id)));
    }
}
