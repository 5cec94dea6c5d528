use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use super::{AuditTrail, NotificationGateway, NotificationTemplate};
use crate::orders::{AssignmentEvent, OrderId};
use crate::workers::WorkerId;

/// In-process audit sink. Backs the simulator and integration tests.
#[derive(Debug, Default)]
pub struct MemoryAuditTrail {
    events: Mutex<Vec<AssignmentEvent>>,
    unavailable: AtomicBool,
}

impl MemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every append fails as if the audit store were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<AssignmentEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events for one order in the order they were appended.
    pub fn events_for(&self, order_id: OrderId) -> Vec<AssignmentEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.order_id == order_id)
            .collect()
    }
}

#[async_trait]
impl AuditTrail for MemoryAuditTrail {
    async fn append(&self, event: AssignmentEvent) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            bail!("audit store unavailable");
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentNotification {
    pub worker_id: WorkerId,
    pub template: NotificationTemplate,
    pub payload: serde_json::Value,
}

#[derive(Debug, Default)]
pub struct MemoryNotificationGateway {
    sent: Mutex<Vec<SentNotification>>,
}

impl MemoryNotificationGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent_to(&self, worker_id: &WorkerId) -> Vec<SentNotification> {
        self.sent()
            .into_iter()
            .filter(|n| &n.worker_id == worker_id)
            .collect()
    }
}

#[async_trait]
impl NotificationGateway for MemoryNotificationGateway {
    async fn notify(
        &self,
        worker_id: &WorkerId,
        template: NotificationTemplate,
        payload: serde_json::Value,
    ) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentNotification {
                worker_id: worker_id.clone(),
                template,
                payload,
            });
        Ok(())
    }
}
