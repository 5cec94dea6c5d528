// Downstream sinks: audit trail and worker notifications. Both are consumed
// fire-and-forget; the order store stays the single source of truth.

pub mod dispatcher;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use crate::orders::AssignmentEvent;
use crate::workers::WorkerId;

pub use dispatcher::SideEffectDispatcher;
pub use memory::{MemoryAuditTrail, MemoryNotificationGateway, SentNotification};

/// Append-only transition log.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn append(&self, event: AssignmentEvent) -> Result<()>;
}

/// Push/SMS delivery to field workers.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn notify(
        &self,
        worker_id: &WorkerId,
        template: NotificationTemplate,
        payload: serde_json::Value,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    AssignmentOffer,
    AssignmentRevoked,
    VisitReminder,
}

impl fmt::Display for NotificationTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationTemplate::AssignmentOffer => "assignment_offer",
            NotificationTemplate::AssignmentRevoked => "assignment_revoked",
            NotificationTemplate::VisitReminder => "visit_reminder",
        };
        write!(f, "{name}")
    }
}

/// Audit trail that writes each event to the tracing pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditTrail;

#[async_trait]
impl AuditTrail for TracingAuditTrail {
    async fn append(&self, event: AssignmentEvent) -> Result<()> {
        info!(
            target: "field_dispatch::audit",
            order_id = %event.order_id,
            worker_id = event.worker_id.as_ref().map(|w| w.as_str()),
            action = ?event.action,
            actor = %event.actor,
            reason = event.reason.as_deref(),
            from = %event.from,
            to = %event.to,
            version = event.version,
            occurred_at = %event.occurred_at,
            late_minutes = event.late_minutes,
            "Assignment event"
        );
        Ok(())
    }
}

/// Notification gateway that only logs. Used when no delivery channel is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotificationGateway;

#[async_trait]
impl NotificationGateway for LoggingNotificationGateway {
    async fn notify(
        &self,
        worker_id: &WorkerId,
        template: NotificationTemplate,
        payload: serde_json::Value,
    ) -> Result<()> {
        info!(
            target: "field_dispatch::notify",
            worker_id = %worker_id,
            template = %template,
            payload = %payload,
            "Worker notification"
        );
        Ok(())
    }
}
