use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{AuditTrail, NotificationGateway, NotificationTemplate};
use crate::observability::DispatchMetrics;
use crate::orders::AssignmentEvent;
use crate::workers::WorkerId;

/// Fans committed transitions out to the audit trail and notification
/// gateway on background tasks.
///
/// Delivery happens after the order write has committed. Failures are
/// logged and counted, never retried inline, and never surface to the
/// caller of the transition. Audit events reach the trail in the order
/// they were recorded.
pub struct SideEffectDispatcher {
    audit: Arc<dyn AuditTrail>,
    notifier: Arc<dyn NotificationGateway>,
    notifications_enabled: bool,
    metrics: Arc<DispatchMetrics>,
    audit_tx: UnboundedSender<AssignmentEvent>,
    audit_rx: Arc<tokio::sync::Mutex<UnboundedReceiver<AssignmentEvent>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl SideEffectDispatcher {
    pub fn new(
        audit: Arc<dyn AuditTrail>,
        notifier: Arc<dyn NotificationGateway>,
        notifications_enabled: bool,
        metrics: Arc<DispatchMetrics>,
    ) -> Self {
        let (audit_tx, audit_rx) = mpsc::unbounded_channel();
        Self {
            audit,
            notifier,
            notifications_enabled,
            metrics,
            audit_tx,
            audit_rx: Arc::new(tokio::sync::Mutex::new(audit_rx)),
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn record(&self, event: AssignmentEvent) {
        if let Err(mpsc::error::SendError(event)) = self.audit_tx.send(event) {
            self.metrics.record_side_effect_failure();
            warn!(order_id = %event.order_id, "Audit queue closed, event dropped");
            return;
        }

        let queue = Arc::clone(&self.audit_rx);
        let audit = Arc::clone(&self.audit);
        let metrics = Arc::clone(&self.metrics);
        self.track(tokio::spawn(async move {
            // The queue stays locked while appending, so whichever task
            // holds it delivers everything queued so far, oldest first.
            let mut queue = queue.lock().await;
            while let Ok(event) = queue.try_recv() {
                let order_id = event.order_id;
                let action = event.action;
                if let Err(e) = audit.append(event).await {
                    metrics.record_side_effect_failure();
                    warn!(
                        order_id = %order_id,
                        action = ?action,
                        error = %e,
                        "Audit append failed, event dropped"
                    );
                }
            }
        }));
    }

    pub fn notify(
        &self,
        worker_id: WorkerId,
        template: NotificationTemplate,
        payload: serde_json::Value,
    ) {
        if !self.notifications_enabled {
            debug!(worker_id = %worker_id, template = %template, "Notifications disabled");
            return;
        }
        let notifier = Arc::clone(&self.notifier);
        let metrics = Arc::clone(&self.metrics);
        self.track(tokio::spawn(async move {
            if let Err(e) = notifier.notify(&worker_id, template, payload).await {
                metrics.record_side_effect_failure();
                warn!(
                    worker_id = %worker_id,
                    template = %template,
                    error = %e,
                    "Worker notification failed"
                );
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Waits for every delivery spawned so far. Used on shutdown and by
    /// tests that inspect the sinks.
    pub async fn settle(&self) {
        let handles: Vec<_> = std::mem::take(
            &mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Side-effect task did not complete");
            }
        }
    }
}

impl std::fmt::Debug for SideEffectDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideEffectDispatcher")
            .field("notifications_enabled", &self.notifications_enabled)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{Actor, AssignmentAction, OrderId, OrderStatus};
    use crate::sinks::{MockAuditTrail, MockNotificationGateway};
    use chrono::Utc;

    fn event() -> AssignmentEvent {
        AssignmentEvent {
            order_id: OrderId::new(),
            worker_id: Some(WorkerId::from("w1")),
            action: AssignmentAction::Assign,
            actor: Actor::System,
            reason: None,
            from: OrderStatus::PendingAssignment,
            to: OrderStatus::Assigning,
            version: 2,
            occurred_at: Utc::now(),
            late_minutes: None,
        }
    }

    #[tokio::test]
    async fn audit_failures_are_counted_and_swallowed() {
        let mut audit = MockAuditTrail::new();
        audit
            .expect_append()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("connection reset")));
        let notifier = MockNotificationGateway::new();
        let metrics = Arc::new(DispatchMetrics::new());

        let dispatcher =
            SideEffectDispatcher::new(Arc::new(audit), Arc::new(notifier), true, metrics.clone());
        dispatcher.record(event());
        dispatcher.settle().await;

        assert_eq!(metrics.snapshot().side_effect_failures, 1);
    }

    /// Audit sink whose first append is slow.
    #[derive(Default)]
    struct SlowFirstAudit {
        versions: Mutex<Vec<u64>>,
    }

    #[async_trait::async_trait]
    impl AuditTrail for SlowFirstAudit {
        async fn append(&self, event: AssignmentEvent) -> anyhow::Result<()> {
            if event.version == 2 {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            }
            self.versions.lock().unwrap().push(event.version);
            Ok(())
        }
    }

    #[tokio::test]
    async fn audit_events_arrive_in_recording_order() {
        let audit = Arc::new(SlowFirstAudit::default());
        let dispatcher = SideEffectDispatcher::new(
            audit.clone(),
            Arc::new(MockNotificationGateway::new()),
            true,
            Arc::new(DispatchMetrics::new()),
        );

        for version in 2..=6 {
            dispatcher.record(AssignmentEvent {
                version,
                ..event()
            });
        }
        dispatcher.settle().await;

        assert_eq!(*audit.versions.lock().unwrap(), vec![2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn disabled_notifications_never_reach_the_gateway() {
        let audit = MockAuditTrail::new();
        let mut notifier = MockNotificationGateway::new();
        notifier.expect_notify().times(0);
        let dispatcher = SideEffectDispatcher::new(
            Arc::new(audit),
            Arc::new(notifier),
            false,
            Arc::new(DispatchMetrics::new()),
        );

        dispatcher.notify(
            WorkerId::from("w1"),
            NotificationTemplate::AssignmentOffer,
            serde_json::json!({}),
        );
        dispatcher.settle().await;
    }

    #[tokio::test]
    async fn notifications_are_delivered_with_payload() {
        let audit = MockAuditTrail::new();
        let mut notifier = MockNotificationGateway::new();
        notifier
            .expect_notify()
            .withf(|worker, template, payload| {
                worker.as_str() == "w7"
                    && *template == NotificationTemplate::VisitReminder
                    && payload["order_id"] == "abc"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let dispatcher = SideEffectDispatcher::new(
            Arc::new(audit),
            Arc::new(notifier),
            true,
            Arc::new(DispatchMetrics::new()),
        );

        dispatcher.notify(
            WorkerId::from("w7"),
            NotificationTemplate::VisitReminder,
            serde_json::json!({ "order_id": "abc" }),
        );
        dispatcher.settle().await;
    }
}
