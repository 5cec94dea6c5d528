// Work order state machine. Every status change in the engine goes through
// `apply_transition`; nothing else writes `status`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::types::{Actor, AssignmentAction, AssignmentEvent, OrderStatus, WorkOrder};
use crate::errors::{require_reason, DispatchError, Result};
use crate::workers::WorkerId;

use self::OrderActionKind as A;
use super::types::OrderStatus as S;

pub const WORKER_DECLINED_REASON: &str = "worker declined";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderAction {
    Assign { worker_id: WorkerId, actor: Actor },
    Accept,
    Reject { reason: Option<String> },
    Reassign { reason: String, actor: Actor },
    TimeoutEscalate { reason: String },
    CheckIn,
    CompleteVisit,
    Confirm,
    Cancel { reason: String, actor: Actor },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderActionKind {
    Assign,
    Accept,
    Reject,
    Reassign,
    TimeoutEscalate,
    CheckIn,
    CompleteVisit,
    Confirm,
    Cancel,
    /// A supervisor status move that maps to none of the above.
    Advance,
}

impl fmt::Display for OrderActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            A::Assign => "assign",
            A::Accept => "accept",
            A::Reject => "reject",
            A::Reassign => "reassign",
            A::TimeoutEscalate => "escalate",
            A::CheckIn => "check in",
            A::CompleteVisit => "complete the visit of",
            A::Confirm => "confirm",
            A::Cancel => "cancel",
            A::Advance => "advance",
        };
        write!(f, "{verb}")
    }
}

impl OrderAction {
    pub fn kind(&self) -> OrderActionKind {
        match self {
            OrderAction::Assign { .. } => A::Assign,
            OrderAction::Accept => A::Accept,
            OrderAction::Reject { .. } => A::Reject,
            OrderAction::Reassign { .. } => A::Reassign,
            OrderAction::TimeoutEscalate { .. } => A::TimeoutEscalate,
            OrderAction::CheckIn => A::CheckIn,
            OrderAction::CompleteVisit => A::CompleteVisit,
            OrderAction::Confirm => A::Confirm,
            OrderAction::Cancel { .. } => A::Cancel,
        }
    }

    fn actor(&self) -> Actor {
        match self {
            OrderAction::Assign { actor, .. }
            | OrderAction::Reassign { actor, .. }
            | OrderAction::Cancel { actor, .. } => *actor,
            OrderAction::Accept
            | OrderAction::Reject { .. }
            | OrderAction::CheckIn
            | OrderAction::CompleteVisit => Actor::Worker,
            OrderAction::Confirm => Actor::Supervisor,
            OrderAction::TimeoutEscalate { .. } => Actor::System,
        }
    }

    fn audit_action(&self) -> AssignmentAction {
        match self {
            OrderAction::Assign { .. } => AssignmentAction::Assign,
            OrderAction::Accept => AssignmentAction::Accept,
            OrderAction::Reject { .. } => AssignmentAction::Reject,
            OrderAction::Reassign { .. } => AssignmentAction::Reassign,
            OrderAction::TimeoutEscalate { .. } => AssignmentAction::TimeoutEscalate,
            OrderAction::CheckIn => AssignmentAction::CheckIn,
            OrderAction::CompleteVisit => AssignmentAction::CompleteVisit,
            OrderAction::Confirm => AssignmentAction::Confirm,
            OrderAction::Cancel { .. } => AssignmentAction::Cancel,
        }
    }
}

/// The complete set of legal moves. Anything absent is `InvalidTransition`.
const TRANSITIONS: &[(OrderStatus, OrderActionKind, OrderStatus)] = &[
    (S::PendingAssignment, A::Assign, S::Assigning),
    (S::Assigning, A::Accept, S::PendingVisit),
    (S::Assigning, A::Reject, S::PendingAssignment),
    (S::Assigning, A::Reassign, S::PendingAssignment),
    (S::Assigning, A::TimeoutEscalate, S::PendingAssignment),
    (S::PendingVisit, A::CheckIn, S::Visiting),
    (S::PendingVisit, A::Reassign, S::PendingAssignment),
    (S::Visiting, A::CompleteVisit, S::PendingConfirmation),
    (S::PendingConfirmation, A::Confirm, S::Completed),
    (S::PendingAssignment, A::Cancel, S::Cancelled),
    (S::Assigning, A::Cancel, S::Cancelled),
    (S::PendingVisit, A::Cancel, S::Cancelled),
    (S::Visiting, A::Cancel, S::Cancelled),
    (S::PendingConfirmation, A::Cancel, S::Cancelled),
];

pub fn transition_target(from: OrderStatus, action: OrderActionKind) -> Option<OrderStatus> {
    TRANSITIONS
        .iter()
        .find(|(status, kind, _)| *status == from && *kind == action)
        .map(|(_, _, to)| *to)
}

/// Result of a guarded transition, not yet committed to the store.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: WorkOrder,
    pub event: AssignmentEvent,
    /// Worker newly bound to the order.
    pub engaged_worker: Option<WorkerId>,
    /// Worker released from the order.
    pub vacated_worker: Option<WorkerId>,
}

/// Validates `action` against the order's current status and computes the
/// next order state. The input order is never modified.
pub fn apply_transition(
    order: &WorkOrder,
    action: OrderAction,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let kind = action.kind();
    let actor = action.actor();
    let audit_action = action.audit_action();

    // Argument checks come before the table so a blank reason is reported
    // as such regardless of status.
    let action = match action {
        OrderAction::Reassign { reason, actor } => OrderAction::Reassign {
            reason: require_reason(&reason)?,
            actor,
        },
        OrderAction::Cancel { reason, actor } => OrderAction::Cancel {
            reason: require_reason(&reason)?,
            actor,
        },
        other => other,
    };

    let from = order.status;
    let to = transition_target(from, kind)
        .ok_or(DispatchError::InvalidTransition { from, action: kind })?;

    let mut next = order.clone();
    next.status = to;
    next.status_changed_at = now;
    next.version = order.version + 1;

    let mut engaged_worker = None;
    let mut vacated_worker = None;
    let mut reason = None;
    let mut late_minutes = None;

    match action {
        OrderAction::Assign { worker_id, .. } => {
            next.assigned_worker_id = Some(worker_id.clone());
            next.cooldown_worker_id = None;
            engaged_worker = Some(worker_id);
        }
        OrderAction::Reject { reason: given } => {
            let given = given
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| WORKER_DECLINED_REASON.to_string());
            vacated_worker = release_for_reassignment(&mut next, &given);
            reason = Some(given);
        }
        OrderAction::Reassign { reason: given, .. }
        | OrderAction::TimeoutEscalate { reason: given } => {
            vacated_worker = release_for_reassignment(&mut next, &given);
            reason = Some(given);
        }
        OrderAction::Confirm => {
            vacated_worker = next.assigned_worker_id.take();
        }
        OrderAction::Cancel { reason: given, .. } => {
            vacated_worker = next.assigned_worker_id.take();
            next.cancel_reason = Some(given.clone());
            reason = Some(given);
        }
        OrderAction::CheckIn => {
            late_minutes = next
                .scheduled_at
                .map(|slot| (now - slot).num_minutes().max(0));
            next.late_minutes = late_minutes;
        }
        OrderAction::Accept | OrderAction::CompleteVisit => {}
    }

    debug_assert!(next.worker_invariant_holds());

    let event = AssignmentEvent {
        order_id: next.id,
        worker_id: engaged_worker
            .clone()
            .or_else(|| vacated_worker.clone())
            .or_else(|| next.assigned_worker_id.clone()),
        action: audit_action,
        actor,
        reason,
        from,
        to,
        version: next.version,
        occurred_at: now,
        late_minutes,
    };

    debug!(
        order_id = %next.id,
        from = %from,
        to = %to,
        version = next.version,
        "Order transition computed"
    );

    Ok(Transition {
        order: next,
        event,
        engaged_worker,
        vacated_worker,
    })
}

fn release_for_reassignment(order: &mut WorkOrder, reason: &str) -> Option<WorkerId> {
    let vacated = order.assigned_worker_id.take();
    order.reassignment_count += 1;
    order.last_reassign_reason = Some(reason.to_string());
    order.cooldown_worker_id = vacated.clone();
    vacated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::types::{CustomerContact, NewWorkOrder, ProjectAddress, VisitKind};
    use chrono::Duration;

    fn pending_order(now: DateTime<Utc>) -> WorkOrder {
        WorkOrder::create(
            NewWorkOrder {
                kind: VisitKind::Measurement,
                category: "curtain".into(),
                customer: CustomerContact {
                    name: "Chen".into(),
                    phone: "13800000000".into(),
                },
                address: ProjectAddress {
                    area: "上海市-普陀区".into(),
                    detail: "Lane 12".into(),
                },
                scheduled_at: None,
            },
            now,
        )
    }

    fn assign(order: &WorkOrder, worker: &str, now: DateTime<Utc>) -> WorkOrder {
        apply_transition(
            order,
            OrderAction::Assign {
                worker_id: WorkerId::from(worker),
                actor: Actor::System,
            },
            now,
        )
        .unwrap()
        .order
    }

    fn all_actions() -> Vec<OrderAction> {
        vec![
            OrderAction::Assign {
                worker_id: WorkerId::from("w9"),
                actor: Actor::System,
            },
            OrderAction::Accept,
            OrderAction::Reject { reason: None },
            OrderAction::Reassign {
                reason: "customer asked".into(),
                actor: Actor::Supervisor,
            },
            OrderAction::TimeoutEscalate {
                reason: "no response".into(),
            },
            OrderAction::CheckIn,
            OrderAction::CompleteVisit,
            OrderAction::Confirm,
            OrderAction::Cancel {
                reason: "duplicate".into(),
                actor: Actor::Supervisor,
            },
        ]
    }

    fn order_in(status: OrderStatus, now: DateTime<Utc>) -> WorkOrder {
        let mut order = pending_order(now);
        order.status = status;
        if status.holds_worker() {
            order.assigned_worker_id = Some(WorkerId::from("w1"));
        }
        order
    }

    #[test]
    fn happy_path_walks_every_open_status() {
        let t0 = Utc::now();
        let order = pending_order(t0);
        let order = assign(&order, "w1", t0 + Duration::minutes(1));
        assert_eq!(order.status, OrderStatus::Assigning);

        let steps = [
            (OrderAction::Accept, OrderStatus::PendingVisit),
            (OrderAction::CheckIn, OrderStatus::Visiting),
            (OrderAction::CompleteVisit, OrderStatus::PendingConfirmation),
            (OrderAction::Confirm, OrderStatus::Completed),
        ];
        let mut current = order;
        for (i, (action, expected)) in steps.into_iter().enumerate() {
            let at = t0 + Duration::minutes(10 * (i as i64 + 2));
            let transition = apply_transition(&current, action, at).unwrap();
            assert_eq!(transition.order.status, expected);
            assert_eq!(transition.order.status_changed_at, at);
            assert_eq!(transition.order.version, current.version + 1);
            assert!(transition.order.worker_invariant_holds());
            current = transition.order;
        }
        assert_eq!(current.assigned_worker_id, None);
    }

    #[test]
    fn every_pair_outside_the_table_is_rejected_without_change() {
        let now = Utc::now();
        for status in OrderStatus::ALL {
            for action in all_actions() {
                let kind = action.kind();
                let order = order_in(status, now);
                let result = apply_transition(&order, action, now + Duration::hours(1));
                match transition_target(status, kind) {
                    Some(to) => {
                        let transition = result.unwrap();
                        assert_eq!(transition.order.status, to);
                        assert!(transition.order.worker_invariant_holds());
                    }
                    None => {
                        assert_eq!(
                            result.unwrap_err(),
                            DispatchError::InvalidTransition {
                                from: status,
                                action: kind
                            }
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn check_in_records_lateness_against_the_booked_slot() {
        let slot = Utc::now();
        let mut booked = order_in(OrderStatus::PendingVisit, slot - Duration::days(1));
        booked.scheduled_at = Some(slot);

        let late = apply_transition(&booked, OrderAction::CheckIn, slot + Duration::minutes(17))
            .unwrap();
        assert_eq!(late.order.late_minutes, Some(17));
        assert_eq!(late.event.late_minutes, Some(17));

        let early = apply_transition(&booked, OrderAction::CheckIn, slot - Duration::minutes(5))
            .unwrap();
        assert_eq!(early.order.late_minutes, Some(0));

        let unbooked = order_in(OrderStatus::PendingVisit, slot);
        let walk_in = apply_transition(&unbooked, OrderAction::CheckIn, slot).unwrap();
        assert_eq!(walk_in.order.late_minutes, None);
        assert_eq!(walk_in.event.late_minutes, None);
    }

    #[test]
    fn cancelling_twice_is_an_invalid_transition() {
        let now = Utc::now();
        let cancel = || OrderAction::Cancel {
            reason: "customer withdrew".into(),
            actor: Actor::Supervisor,
        };
        let cancelled = apply_transition(&pending_order(now), cancel(), now)
            .unwrap()
            .order;
        assert_eq!(cancelled.cancel_reason.as_deref(), Some("customer withdrew"));
        assert!(matches!(
            apply_transition(&cancelled, cancel(), now),
            Err(DispatchError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn rejection_releases_worker_and_sets_cooldown() {
        let now = Utc::now();
        let assigned = assign(&pending_order(now), "w1", now);
        let transition = apply_transition(
            &assigned,
            OrderAction::Reject {
                reason: Some("  too far  ".into()),
            },
            now,
        )
        .unwrap();

        assert_eq!(transition.order.status, OrderStatus::PendingAssignment);
        assert_eq!(transition.order.assigned_worker_id, None);
        assert_eq!(transition.order.reassignment_count, 1);
        assert_eq!(transition.order.last_reassign_reason.as_deref(), Some("too far"));
        assert_eq!(transition.order.cooldown_worker_id, Some(WorkerId::from("w1")));
        assert_eq!(transition.vacated_worker, Some(WorkerId::from("w1")));
        assert_eq!(transition.event.action, AssignmentAction::Reject);
        assert_eq!(transition.event.actor, Actor::Worker);
    }

    #[test]
    fn blank_rejection_text_falls_back_to_default_reason() {
        let now = Utc::now();
        let assigned = assign(&pending_order(now), "w1", now);
        let transition = apply_transition(
            &assigned,
            OrderAction::Reject {
                reason: Some("   ".into()),
            },
            now,
        )
        .unwrap();
        assert_eq!(
            transition.order.last_reassign_reason.as_deref(),
            Some(WORKER_DECLINED_REASON)
        );
    }

    #[test]
    fn manual_reassign_from_pending_visit_needs_a_reason() {
        let now = Utc::now();
        let order = order_in(OrderStatus::PendingVisit, now);
        let err = apply_transition(
            &order,
            OrderAction::Reassign {
                reason: " ".into(),
                actor: Actor::Supervisor,
            },
            now,
        )
        .unwrap_err();
        assert_eq!(err, DispatchError::ReasonRequired);
    }

    #[test]
    fn assignment_clears_cooldown() {
        let now = Utc::now();
        let mut order = pending_order(now);
        order.cooldown_worker_id = Some(WorkerId::from("w1"));
        let assigned = assign(&order, "w2", now);
        assert_eq!(assigned.cooldown_worker_id, None);
    }
}
