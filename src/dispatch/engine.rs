use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, Instrument};

use super::assigner::Assigner;
use super::reassignment::{EscalationOutcome, ReassignmentCoordinator};
use super::{commit_transition, AssignTarget};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, DispatchConfig};
use crate::errors::{DispatchError, ErrorKind, Result};
use crate::observability::{DispatchMetrics, DispatchStats, OperationTimer};
use crate::orders::{
    apply_transition, Actor, NewWorkOrder, OrderAction, OrderActionKind, OrderId, OrderStatus,
    OrderStore, Transition, VisitKind, WorkOrder,
};
use crate::sinks::{
    AuditTrail, LoggingNotificationGateway, NotificationGateway, NotificationTemplate,
    SideEffectDispatcher, TracingAuditTrail,
};
use crate::sla::{SlaMonitor, SlaReport, SlaTier};
use crate::telemetry::{create_dispatch_span, generate_correlation_id};
use crate::workers::{WorkerDirectory, WorkerId, WorkloadLedger};

/// An order as returned to callers: its committed state plus the SLA tier
/// computed at the moment of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub order: WorkOrder,
    pub tier: SlaTier,
}

/// Filter for `list_with_sla`. Empty fields match everything; closed orders
/// are left out unless `include_closed` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub kind: Option<VisitKind>,
    pub worker_id: Option<WorkerId>,
    pub min_tier: Option<SlaTier>,
    pub include_closed: bool,
}

impl OrderFilter {
    fn admits(&self, order: &WorkOrder) -> bool {
        (self.include_closed || order.status.is_open() || self.status == Some(order.status))
            && self.status.map_or(true, |status| order.status == status)
            && self.kind.map_or(true, |kind| order.kind == kind)
            && self
                .worker_id
                .as_ref()
                .map_or(true, |worker| order.assigned_worker_id.as_ref() == Some(worker))
    }
}

/// Per-item result of a batch reassignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: Vec<OrderId>,
    pub failed: Vec<(OrderId, ErrorKind)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderOutcome {
    pub sent: Vec<OrderId>,
    /// Already reminded within the reminder cool-down window.
    pub throttled: Vec<OrderId>,
    pub failed: Vec<(OrderId, ErrorKind)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EscalationSweep {
    pub escalated: Vec<OrderId>,
    /// Candidates that moved on between classification and escalation.
    pub skipped: usize,
    pub failed: Vec<(OrderId, ErrorKind)>,
}

pub struct DispatchEngineBuilder {
    directory: Arc<dyn WorkerDirectory>,
    audit: Arc<dyn AuditTrail>,
    notifier: Arc<dyn NotificationGateway>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl DispatchEngineBuilder {
    pub fn audit_trail(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = audit;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn NotificationGateway>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> std::result::Result<DispatchEngine, ConfigError> {
        let policy = self.config.validate()?;
        let reminder_cooldown = self.config.notifications.reminder_cooldown()?;
        let store = Arc::new(OrderStore::new());
        let workload = Arc::new(WorkloadLedger::new());
        let metrics = Arc::new(DispatchMetrics::new());

        Ok(DispatchEngine {
            assigner: Assigner::new(
                self.directory,
                Arc::clone(&workload),
                Arc::clone(&store),
                self.config.assignment.clone(),
            ),
            reassignment: ReassignmentCoordinator::new(Arc::clone(&store), Arc::clone(&workload)),
            monitor: SlaMonitor::new(policy),
            effects: SideEffectDispatcher::new(
                self.audit,
                self.notifier,
                self.config.notifications.enabled,
                Arc::clone(&metrics),
            ),
            store,
            workload,
            clock: self.clock,
            metrics,
            reminders: Mutex::new(HashMap::new()),
            reminder_cooldown,
        })
    }
}

/// The dispatch engine's public surface. Every mutating call takes the
/// version the caller last read and fails with `ConcurrentModification` if
/// the order has moved since. State commits first; audit and notification
/// delivery follow on background tasks.
pub struct DispatchEngine {
    store: Arc<OrderStore>,
    workload: Arc<WorkloadLedger>,
    assigner: Assigner,
    reassignment: ReassignmentCoordinator,
    monitor: SlaMonitor,
    effects: SideEffectDispatcher,
    clock: Arc<dyn Clock>,
    metrics: Arc<DispatchMetrics>,
    /// Order id → last visit reminder sent, for reminders still inside the
    /// cool-down window.
    reminders: Mutex<HashMap<OrderId, DateTime<Utc>>>,
    reminder_cooldown: Duration,
}

impl DispatchEngine {
    /// Starts a builder with tracing-backed sinks, the system clock and
    /// default configuration.
    pub fn builder(directory: Arc<dyn WorkerDirectory>) -> DispatchEngineBuilder {
        DispatchEngineBuilder {
            directory,
            audit: Arc::new(TracingAuditTrail),
            notifier: Arc::new(LoggingNotificationGateway),
            clock: Arc::new(SystemClock),
            config: DispatchConfig::default(),
        }
    }

    pub async fn create_order(&self, details: NewWorkOrder) -> Result<OrderView> {
        let now = self.clock.now();
        let order = WorkOrder::create(details, now);
        self.store.insert(order.clone());
        info!(
            order_id = %order.id,
            kind = ?order.kind,
            category = %order.category,
            area = %order.area(),
            "Work order created"
        );
        Ok(self.view(order, now))
    }

    pub fn get(&self, order_id: OrderId) -> Result<OrderView> {
        let order = self.store.get(order_id)?;
        Ok(self.view(order, self.clock.now()))
    }

    /// PENDING_ASSIGNMENT → ASSIGNING, either by ranking or to a chosen worker.
    pub async fn assign(
        &self,
        order_id: OrderId,
        expected_version: u64,
        target: AssignTarget,
    ) -> Result<OrderView> {
        let correlation_id = generate_correlation_id();
        let span = create_dispatch_span(
            "assign",
            Some(&order_id.to_string()),
            None,
            Some(&correlation_id),
        );

        let result = async {
            let order = self.store.get_at_version(order_id, expected_version)?;
            let now = self.clock.now();
            let transition = self.assigner.assign(&order, target, now).await?;

            self.metrics.record_assignment();
            if let Some(worker_id) = &transition.engaged_worker {
                self.effects.notify(
                    worker_id.clone(),
                    NotificationTemplate::AssignmentOffer,
                    order_payload(&transition.order),
                );
            }
            Ok::<_, DispatchError>(self.finish(transition, now))
        }
        .instrument(span)
        .await;

        self.track(result)
    }

    /// The assigned worker's answer to an offer. A refusal goes back to the
    /// pool with the worker's text as the reason.
    pub async fn record_worker_response(
        &self,
        order_id: OrderId,
        expected_version: u64,
        accept: bool,
        reason: Option<String>,
    ) -> Result<OrderView> {
        let span = create_dispatch_span("worker_response", Some(&order_id.to_string()), None, None);

        let result = async {
            let order = self.store.get_at_version(order_id, expected_version)?;
            let now = self.clock.now();
            let transition = if accept {
                let transition = apply_transition(&order, OrderAction::Accept, now)?;
                let transition =
                    commit_transition(&self.store, &self.workload, order.version, transition)?;
                info!(
                    order_id = %order_id,
                    worker_id = ?transition.order.assigned_worker_id,
                    "Worker accepted assignment"
                );
                transition
            } else {
                let transition = self.reassignment.record_rejection(&order, reason, now)?;
                self.metrics.record_rejection();
                transition
            };
            Ok::<_, DispatchError>(self.finish(transition, now))
        }
        .instrument(span)
        .await;

        self.track(result)
    }

    /// Returns an order to the pool. `Actor::Worker` is treated as a
    /// rejection; supervisor and system callers must give a reason.
    pub async fn reassign(
        &self,
        order_id: OrderId,
        expected_version: u64,
        reason: &str,
        actor: Actor,
    ) -> Result<OrderView> {
        let span = create_dispatch_span("reassign", Some(&order_id.to_string()), None, None);

        let result = async {
            let order = self.store.get_at_version(order_id, expected_version)?;
            let now = self.clock.now();
            let transition = self.reassignment.reassign(&order, reason, actor, now)?;

            if actor == Actor::Worker {
                self.metrics.record_rejection();
            } else {
                self.metrics.record_reassignment();
                self.notify_revoked(&transition);
            }
            Ok::<_, DispatchError>(self.finish(transition, now))
        }
        .instrument(span)
        .await;

        self.track(result)
    }

    /// Moves an order forward along the visit flow: VISITING (check-in),
    /// PENDING_CONFIRMATION (visit complete) or COMPLETED (confirmed).
    pub async fn advance(
        &self,
        order_id: OrderId,
        expected_version: u64,
        target: OrderStatus,
    ) -> Result<OrderView> {
        let span = create_dispatch_span("advance", Some(&order_id.to_string()), None, None);

        let result = async {
            let order = self.store.get_at_version(order_id, expected_version)?;
            let action = match target {
                OrderStatus::Visiting => OrderAction::CheckIn,
                OrderStatus::PendingConfirmation => OrderAction::CompleteVisit,
                OrderStatus::Completed => OrderAction::Confirm,
                _ => {
                    return Err(DispatchError::InvalidTransition {
                        from: order.status,
                        action: OrderActionKind::Advance,
                    })
                }
            };

            let now = self.clock.now();
            let transition = apply_transition(&order, action, now)?;
            let transition =
                commit_transition(&self.store, &self.workload, order.version, transition)?;
            info!(
                order_id = %order_id,
                from = %order.status,
                to = %transition.order.status,
                late_minutes = ?transition.event.late_minutes,
                "Work order advanced"
            );
            Ok::<_, DispatchError>(self.finish(transition, now))
        }
        .instrument(span)
        .await;

        self.track(result)
    }

    pub async fn cancel(
        &self,
        order_id: OrderId,
        expected_version: u64,
        reason: &str,
    ) -> Result<OrderView> {
        let span = create_dispatch_span("cancel", Some(&order_id.to_string()), None, None);

        let result = async {
            let order = self.store.get_at_version(order_id, expected_version)?;
            let now = self.clock.now();
            let transition = apply_transition(
                &order,
                OrderAction::Cancel {
                    reason: reason.to_string(),
                    actor: Actor::Supervisor,
                },
                now,
            )?;
            let transition =
                commit_transition(&self.store, &self.workload, order.version, transition)?;
            info!(
                order_id = %order_id,
                from = %order.status,
                reason = ?transition.order.cancel_reason,
                "Work order cancelled"
            );
            self.notify_revoked(&transition);
            Ok::<_, DispatchError>(self.finish(transition, now))
        }
        .instrument(span)
        .await;

        self.track(result)
    }

    /// Orders matching `filter` with their tier at the current time, oldest
    /// first.
    pub fn list_with_sla(&self, filter: &OrderFilter) -> Vec<OrderView> {
        let now = self.clock.now();
        self.store
            .select(|order| filter.admits(order))
            .into_iter()
            .map(|order| self.view(order, now))
            .filter(|view| filter.min_tier.map_or(true, |min| view.tier >= min))
            .collect()
    }

    /// Supervisor reassignment of many orders. Each item stands alone: one
    /// failure never stops or undoes the others.
    pub async fn batch_reassign(&self, orders: &[(OrderId, u64)], reason: &str) -> BatchOutcome {
        let timer = OperationTimer::new("batch_reassign");
        let mut outcome = BatchOutcome::default();

        for (order_id, expected_version) in orders {
            match self
                .reassign(*order_id, *expected_version, reason, Actor::Supervisor)
                .await
            {
                Ok(_) => outcome.succeeded.push(*order_id),
                Err(e) => {
                    debug!(order_id = %order_id, error = %e, "Batch reassign item failed");
                    outcome.failed.push((*order_id, e.kind()));
                }
            }
        }

        info!(
            requested = orders.len(),
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            "Batch reassign finished"
        );
        timer.finish();
        outcome
    }

    /// Sends a visit reminder to the assigned worker of each order, at most
    /// once per order within the reminder cool-down.
    pub async fn batch_remind(&self, order_ids: &[OrderId]) -> ReminderOutcome {
        let now = self.clock.now();
        let mut outcome = ReminderOutcome::default();

        // Entries past the window no longer throttle anything.
        self.reminders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, last| now - *last < self.reminder_cooldown);

        for order_id in order_ids {
            let order = match self.store.get(*order_id) {
                Ok(order) => order,
                Err(e) => {
                    outcome.failed.push((*order_id, e.kind()));
                    continue;
                }
            };
            let Some(worker_id) = order.assigned_worker_id.clone() else {
                outcome
                    .failed
                    .push((*order_id, DispatchError::NotAssigned(*order_id).kind()));
                continue;
            };

            {
                let mut reminders = self.reminders.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(last) = reminders.get(order_id) {
                    if now - *last < self.reminder_cooldown {
                        debug!(order_id = %order_id, last_reminded = %last, "Reminder throttled");
                        outcome.throttled.push(*order_id);
                        continue;
                    }
                }
                reminders.insert(*order_id, now);
            }

            self.effects.notify(
                worker_id,
                NotificationTemplate::VisitReminder,
                order_payload(&order),
            );
            outcome.sent.push(*order_id);
        }

        info!(
            sent = outcome.sent.len(),
            throttled = outcome.throttled.len(),
            failed = outcome.failed.len(),
            "Visit reminders dispatched"
        );
        outcome
    }

    /// One SLA pass: every ASSIGNING order the monitor rates CRITICAL goes
    /// back to the pool. Safe to run as often as the caller likes.
    pub async fn escalate_timeouts(&self) -> EscalationSweep {
        let timer = OperationTimer::new("escalate_timeouts");
        let now = self.clock.now();
        let open = self.store.select(|order| order.status.is_open());
        let report = self.monitor.classify(&open, now);
        let mut sweep = EscalationSweep::default();

        for order in self.monitor.escalation_candidates(&report, &open) {
            match self.reassignment.escalate_timeout(order, now) {
                Ok(EscalationOutcome::Escalated(transition)) => {
                    self.metrics.record_escalation();
                    self.notify_revoked(&transition);
                    sweep.escalated.push(order.id);
                    self.finish(transition, now);
                }
                Ok(EscalationOutcome::Superseded) => {
                    sweep.skipped += 1;
                }
                Err(e) => sweep.failed.push((order.id, e.kind())),
            }
        }

        if !sweep.escalated.is_empty() || !sweep.failed.is_empty() {
            info!(
                escalated = sweep.escalated.len(),
                skipped = sweep.skipped,
                failed = sweep.failed.len(),
                "Timeout escalation sweep finished"
            );
        }
        timer.finish();
        sweep
    }

    /// Tier histogram over all open orders at the current time.
    pub fn sla_dashboard(&self) -> SlaReport {
        let open = self.store.select(|order| order.status.is_open());
        self.monitor.classify(&open, self.clock.now())
    }

    pub fn open_assignments(&self, worker_id: &WorkerId) -> u32 {
        self.workload.open_count(worker_id)
    }

    pub fn metrics(&self) -> DispatchStats {
        self.metrics.snapshot()
    }

    /// Waits for outstanding audit and notification deliveries.
    pub async fn settle(&self) {
        self.effects.settle().await;
    }

    /// Flushes outstanding deliveries and logs the final counters.
    pub async fn shutdown(&self) {
        self.settle().await;
        self.metrics.log_stats();
    }

    fn view(&self, order: WorkOrder, now: DateTime<Utc>) -> OrderView {
        let tier = self.monitor.tier_for(&order, now);
        OrderView { order, tier }
    }

    fn finish(&self, transition: Transition, now: DateTime<Utc>) -> OrderView {
        self.metrics.record_transition();
        self.effects.record(transition.event);
        self.view(transition.order, now)
    }

    fn notify_revoked(&self, transition: &Transition) {
        if let Some(worker_id) = &transition.vacated_worker {
            self.effects.notify(
                worker_id.clone(),
                NotificationTemplate::AssignmentRevoked,
                json!({
                    "order_id": transition.order.id,
                    "reason": transition.event.reason,
                }),
            );
        }
    }

    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(DispatchError::ConcurrentModification { order_id, .. }) = &result {
            self.metrics.record_conflict();
            debug!(order_id = %order_id, "Stale version token");
        }
        result
    }
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("orders", &self.store.len())
            .field("assigner", &self.assigner)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

fn order_payload(order: &WorkOrder) -> serde_json::Value {
    json!({
        "order_id": order.id,
        "kind": order.kind,
        "category": order.category,
        "area": order.address.area,
        "address": order.address.detail,
        "customer": order.customer.name,
        "scheduled_at": order.scheduled_at,
    })
}
