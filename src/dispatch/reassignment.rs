use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use super::commit_transition;
use crate::errors::{DispatchError, Result};
use crate::orders::{
    apply_transition, Actor, OrderAction, OrderStatus, OrderStore, Transition, WorkOrder,
};
use crate::workers::WorkloadLedger;

/// What a timeout escalation request amounted to.
#[derive(Debug, Clone)]
pub enum EscalationOutcome {
    Escalated(Transition),
    /// The order moved on (accepted, reassigned, cancelled, or already
    /// escalated) after the monitor looked at it.
    Superseded,
}

/// Funnels the three reassignment triggers through the order state machine:
/// worker rejection, supervisor reassignment, and SLA timeout escalation.
/// Every path returns the order to PENDING_ASSIGNMENT with the vacated
/// worker on cool-down and its open assignment count released.
pub struct ReassignmentCoordinator {
    store: Arc<OrderStore>,
    workload: Arc<WorkloadLedger>,
}

impl ReassignmentCoordinator {
    pub fn new(store: Arc<OrderStore>, workload: Arc<WorkloadLedger>) -> Self {
        Self { store, workload }
    }

    pub fn record_rejection(
        &self,
        order: &WorkOrder,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let transition = apply_transition(order, OrderAction::Reject { reason }, now)?;
        let transition = commit_transition(&self.store, &self.workload, order.version, transition)?;
        info!(
            order_id = %order.id,
            worker_id = ?transition.vacated_worker,
            reason = ?transition.order.last_reassign_reason,
            reassignments = transition.order.reassignment_count,
            "Worker rejected assignment"
        );
        Ok(transition)
    }

    pub fn reassign(
        &self,
        order: &WorkOrder,
        reason: &str,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if actor == Actor::Worker {
            return self.record_rejection(order, Some(reason.to_string()), now);
        }
        let transition = apply_transition(
            order,
            OrderAction::Reassign {
                reason: reason.to_string(),
                actor,
            },
            now,
        )?;
        let transition = commit_transition(&self.store, &self.workload, order.version, transition)?;
        info!(
            order_id = %order.id,
            worker_id = ?transition.vacated_worker,
            actor = %actor,
            reason = ?transition.order.last_reassign_reason,
            reassignments = transition.order.reassignment_count,
            "Work order reassigned"
        );
        Ok(transition)
    }

    /// Escalates an order the SLA monitor saw as CRITICAL while ASSIGNING.
    /// `observed` is the order as the monitor read it. Escalating bumps the
    /// version, so repeated requests for the same observation are
    /// superseded.
    pub fn escalate_timeout(
        &self,
        observed: &WorkOrder,
        now: DateTime<Utc>,
    ) -> Result<EscalationOutcome> {
        let current = self.store.get(observed.id)?;
        if current.version != observed.version || current.status != OrderStatus::Assigning {
            debug!(
                order_id = %observed.id,
                observed_version = observed.version,
                current_version = current.version,
                status = %current.status,
                "Escalation superseded by a newer order state"
            );
            return Ok(EscalationOutcome::Superseded);
        }

        let waited_hours = (now - current.status_changed_at).num_minutes() as f64 / 60.0;
        let reason = match &current.assigned_worker_id {
            Some(worker_id) => format!(
                "no response from worker {worker_id} after {waited_hours:.1}h; escalated by SLA monitor"
            ),
            None => format!("no response after {waited_hours:.1}h; escalated by SLA monitor"),
        };

        let transition =
            apply_transition(&current, OrderAction::TimeoutEscalate { reason }, now)?;
        let transition =
            match commit_transition(&self.store, &self.workload, current.version, transition) {
                Ok(transition) => transition,
                Err(DispatchError::ConcurrentModification { .. }) => {
                    return Ok(EscalationOutcome::Superseded)
                }
                Err(e) => return Err(e),
            };

        info!(
            order_id = %observed.id,
            worker_id = ?transition.vacated_worker,
            waited_hours,
            "Assignment timed out, order returned to pool"
        );
        Ok(EscalationOutcome::Escalated(transition))
    }
}

impl std::fmt::Debug for ReassignmentCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassignmentCoordinator").finish_non_exhaustive()
    }
}
