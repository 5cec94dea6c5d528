use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Dispatch engine counters. Relaxed atomics: these are advisory totals,
/// never used to make decisions.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub transitions: AtomicU64,
    pub assignments: AtomicU64,
    pub rejections: AtomicU64,
    pub reassignments: AtomicU64,
    pub escalations: AtomicU64,
    pub conflicts: AtomicU64,
    pub side_effect_failures: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assignment(&self) {
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reassignment(&self) {
        self.reassignments.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_escalation(&self) {
        self.escalations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_side_effect_failure(&self) {
        self.side_effect_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            transitions: self.transitions.load(Ordering::Relaxed),
            assignments: self.assignments.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            reassignments: self.reassignments.load(Ordering::Relaxed),
            escalations: self.escalations.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            side_effect_failures: self.side_effect_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.snapshot();
        info!(
            transitions = stats.transitions,
            assignments = stats.assignments,
            rejections = stats.rejections,
            reassignments = stats.reassignments,
            escalations = stats.escalations,
            conflicts = stats.conflicts,
            side_effect_failures = stats.side_effect_failures,
            "Dispatch metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub transitions: u64,
    pub assignments: u64,
    pub rejections: u64,
    pub reassignments: u64,
    pub escalations: u64,
    pub conflicts: u64,
    pub side_effect_failures: u64,
}

/// Time an operation and log its duration on `finish`.
pub struct OperationTimer {
    operation: &'static str,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        info!(
            operation = self.operation,
            duration_ms = self.start.elapsed().as_millis() as u64,
            "Operation completed"
        );
    }
}
