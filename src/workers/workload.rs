use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use super::types::{WorkerId, WorkerSnapshot};

/// Open assignment counts per worker.
///
/// The directory owns every other worker attribute; this ledger is the only
/// writer of `open_assignment_count`. Each adjustment is a single atomic
/// operation on the worker's own counter, so concurrent assignments to
/// different orders never lose updates.
#[derive(Debug, Default)]
pub struct WorkloadLedger {
    counters: RwLock<HashMap<WorkerId, Arc<AtomicU32>>>,
}

impl WorkloadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, worker_id: &WorkerId, seed: u32) -> Arc<AtomicU32> {
        if let Some(counter) = self
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker_id)
        {
            return Arc::clone(counter);
        }
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            counters
                .entry(worker_id.clone())
                .or_insert_with(|| Arc::new(AtomicU32::new(seed))),
        )
    }

    /// Overlays the ledger's count onto a directory snapshot. A worker seen
    /// for the first time is seeded from the count the directory reported.
    pub fn overlay(&self, mut snapshot: WorkerSnapshot) -> WorkerSnapshot {
        let counter = self.counter(&snapshot.id, snapshot.open_assignment_count);
        snapshot.open_assignment_count = counter.load(Ordering::Acquire);
        snapshot
    }

    pub fn open_count(&self, worker_id: &WorkerId) -> u32 {
        self.counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(worker_id)
            .map(|counter| counter.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Returns the count after the increment.
    pub fn increment(&self, worker_id: &WorkerId) -> u32 {
        self.counter(worker_id, 0).fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the count after the decrement. Never goes below zero.
    pub fn decrement(&self, worker_id: &WorkerId) -> u32 {
        let counter = self.counter(worker_id, 0);
        match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1)) {
            Ok(previous) => previous - 1,
            Err(_) => {
                warn!(worker_id = %worker_id, "open assignment count already zero");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::LiveStatus;

    #[test]
    fn decrement_saturates_at_zero() {
        let ledger = WorkloadLedger::new();
        let id = WorkerId::from("w1");
        assert_eq!(ledger.increment(&id), 1);
        assert_eq!(ledger.decrement(&id), 0);
        assert_eq!(ledger.decrement(&id), 0);
        assert_eq!(ledger.open_count(&id), 0);
    }

    #[test]
    fn overlay_seeds_once_then_ledger_wins() {
        let ledger = WorkloadLedger::new();
        let snapshot = WorkerSnapshot {
            id: WorkerId::from("w1"),
            name: "Zhang".into(),
            skill_categories: Default::default(),
            service_areas: Default::default(),
            live_status: LiveStatus::Online,
            open_assignment_count: 3,
            historical_accept_rate: 0.5,
            average_response_minutes: 30.0,
        };

        assert_eq!(ledger.overlay(snapshot.clone()).open_assignment_count, 3);
        ledger.increment(&snapshot.id);
        // The directory's stale count no longer matters.
        assert_eq!(ledger.overlay(snapshot).open_assignment_count, 4);
    }

    #[test]
    fn concurrent_increments_are_not_lost() {
        let ledger = Arc::new(WorkloadLedger::new());
        let id = WorkerId::from("w1");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        ledger.increment(&id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.open_count(&id), 800);
    }
}
