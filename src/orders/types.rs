use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::workers::WorkerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VisitKind {
    Measurement,
    Installation,
}

/// Lifecycle of a work order. Closed set; every legal move between these is
/// listed in the transition table in `state_machine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingAssignment,
    Assigning,
    PendingVisit,
    Visiting,
    PendingConfirmation,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::PendingAssignment,
        OrderStatus::Assigning,
        OrderStatus::PendingVisit,
        OrderStatus::Visiting,
        OrderStatus::PendingConfirmation,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn is_open(self) -> bool {
        !self.is_terminal()
    }

    /// Statuses in which an order must carry an assigned worker, and the only
    /// ones in which it may.
    pub fn holds_worker(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigning
                | OrderStatus::PendingVisit
                | OrderStatus::Visiting
                | OrderStatus::PendingConfirmation
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::PendingAssignment => "PENDING_ASSIGNMENT",
            OrderStatus::Assigning => "ASSIGNING",
            OrderStatus::PendingVisit => "PENDING_VISIT",
            OrderStatus::Visiting => "VISITING",
            OrderStatus::PendingConfirmation => "PENDING_CONFIRMATION",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAddress {
    /// Service area key, e.g. "上海市-普陀区". Matched against worker areas.
    pub area: String,
    pub detail: String,
}

/// Caller-supplied details for `create_order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkOrder {
    pub kind: VisitKind,
    /// Product line, e.g. "curtain". Matched against worker skills.
    pub category: String,
    pub customer: CustomerContact,
    pub address: ProjectAddress,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: OrderId,
    pub kind: VisitKind,
    pub category: String,
    pub customer: CustomerContact,
    pub address: ProjectAddress,
    pub status: OrderStatus,
    pub assigned_worker_id: Option<WorkerId>,
    /// Customer-requested visit slot.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Anchors the SLA clock. Moves on every transition and only then.
    pub status_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub reassignment_count: u32,
    pub last_reassign_reason: Option<String>,
    /// Worker vacated by the most recent reassignment; skipped by the next
    /// automatic assignment cycle.
    pub cooldown_worker_id: Option<WorkerId>,
    pub cancel_reason: Option<String>,
    /// Minutes past `scheduled_at` at check-in; zero when on time. Unset
    /// before check-in or when no slot was booked.
    #[serde(default)]
    pub late_minutes: Option<i64>,
    /// Optimistic concurrency token. Strictly increasing.
    pub version: u64,
}

impl WorkOrder {
    pub fn create(details: NewWorkOrder, now: DateTime<Utc>) -> Self {
        Self {
            id: OrderId::new(),
            kind: details.kind,
            category: details.category,
            customer: details.customer,
            address: details.address,
            status: OrderStatus::PendingAssignment,
            assigned_worker_id: None,
            scheduled_at: details.scheduled_at,
            status_changed_at: now,
            created_at: now,
            reassignment_count: 0,
            last_reassign_reason: None,
            cooldown_worker_id: None,
            cancel_reason: None,
            late_minutes: None,
            version: 1,
        }
    }

    pub fn area(&self) -> &str {
        &self.address.area
    }

    /// assigned worker present exactly when the status requires one.
    pub fn worker_invariant_holds(&self) -> bool {
        self.assigned_worker_id.is_some() == self.status.holds_worker()
    }
}

/// Who initiated a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Actor {
    Worker,
    Supervisor,
    System,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Actor::Worker => "worker",
            Actor::Supervisor => "supervisor",
            Actor::System => "system",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentAction {
    Assign,
    Accept,
    Reject,
    Reassign,
    TimeoutEscalate,
    CheckIn,
    CompleteVisit,
    Confirm,
    Cancel,
}

/// Append-only record of one committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub order_id: OrderId,
    pub worker_id: Option<WorkerId>,
    pub action: AssignmentAction,
    pub actor: Actor,
    pub reason: Option<String>,
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Order version after the transition.
    pub version: u64,
    pub occurred_at: DateTime<Utc>,
    /// Set on CHECK_IN for orders with a booked slot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late_minutes: Option<i64>,
}
