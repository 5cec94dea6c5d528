// Assignment, reassignment and the engine facade that ties them to the order
// store, SLA monitor and downstream sinks.

pub mod assigner;
pub mod engine;
pub mod ranking;
pub mod reassignment;

use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::orders::{OrderStore, Transition};
use crate::workers::{WorkerId, WorkloadLedger};

pub use assigner::Assigner;
pub use engine::{
    BatchOutcome, DispatchEngine, DispatchEngineBuilder, EscalationSweep, OrderFilter, OrderView,
    ReminderOutcome,
};
pub use ranking::{compare_candidates, is_eligible, rank_candidates};
pub use reassignment::{EscalationOutcome, ReassignmentCoordinator};

/// Who should receive a pending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssignTarget {
    /// Let the ranking pick.
    Auto,
    /// Supervisor choice, still subject to the skill/area guard.
    Worker(WorkerId),
    /// Supervisor choice bypassing the skill/area guard. Logged.
    Override {
        worker_id: WorkerId,
        justification: String,
    },
}

/// Commits a computed transition and then settles the workload ledger: the
/// engaged worker gains one open assignment, the vacated one loses one.
/// Nothing is counted if the commit loses a version race.
pub(crate) fn commit_transition(
    store: &OrderStore,
    workload: &WorkloadLedger,
    expected_version: u64,
    transition: Transition,
) -> Result<Transition> {
    store.commit(expected_version, transition.order.clone())?;
    if let Some(worker_id) = &transition.engaged_worker {
        workload.increment(worker_id);
    }
    if let Some(worker_id) = &transition.vacated_worker {
        workload.decrement(worker_id);
    }
    Ok(transition)
}
