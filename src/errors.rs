use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::orders::{OrderActionKind, OrderId, OrderStatus};
use crate::workers::WorkerId;

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Every failure the dispatch engine reports to callers. All of them are
/// recoverable; none leave a work order partially written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("cannot {action} an order in status {from}")]
    InvalidTransition {
        from: OrderStatus,
        action: OrderActionKind,
    },
    #[error("no eligible worker for category '{category}' in area '{area}'")]
    NoEligibleWorker { category: String, area: String },
    #[error("a non-empty reason is required")]
    ReasonRequired,
    #[error("order {order_id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },
    #[error("worker {worker_id} is not eligible for order {order_id}")]
    IneligibleWorker {
        order_id: OrderId,
        worker_id: WorkerId,
    },
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("worker directory unavailable: {0}")]
    DirectoryUnavailable(String),
    #[error("order {0} has no assigned worker")]
    NotAssigned(OrderId),
}

impl DispatchError {
    pub fn order_not_found(id: OrderId) -> Self {
        DispatchError::NotFound {
            entity: "work order",
            id: id.to_string(),
        }
    }

    pub fn worker_not_found(id: &WorkerId) -> Self {
        DispatchError::NotFound {
            entity: "worker",
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DispatchError::NoEligibleWorker { .. } => ErrorKind::NoEligibleWorker,
            DispatchError::ReasonRequired => ErrorKind::ReasonRequired,
            DispatchError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            DispatchError::IneligibleWorker { .. } => ErrorKind::IneligibleWorker,
            DispatchError::NotFound { .. } => ErrorKind::NotFound,
            DispatchError::DirectoryUnavailable(_) => ErrorKind::DirectoryUnavailable,
            DispatchError::NotAssigned(_) => ErrorKind::NotAssigned,
        }
    }
}

/// Discriminant of [`DispatchError`], reported per item by batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidTransition,
    NoEligibleWorker,
    ReasonRequired,
    ConcurrentModification,
    IneligibleWorker,
    NotFound,
    DirectoryUnavailable,
    NotAssigned,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::InvalidTransition => "INVALID_TRANSITION",
            ErrorKind::NoEligibleWorker => "NO_ELIGIBLE_WORKER",
            ErrorKind::ReasonRequired => "REASON_REQUIRED",
            ErrorKind::ConcurrentModification => "CONCURRENT_MODIFICATION",
            ErrorKind::IneligibleWorker => "INELIGIBLE_WORKER",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::DirectoryUnavailable => "DIRECTORY_UNAVAILABLE",
            ErrorKind::NotAssigned => "NOT_ASSIGNED",
        };
        write!(f, "{label}")
    }
}

/// Trims a caller-supplied justification, rejecting blank input.
pub fn require_reason(reason: &str) -> Result<String> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(DispatchError::ReasonRequired);
    }
    Ok(trimmed.to_string())
}
