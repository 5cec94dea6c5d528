use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::ranking::{is_eligible, rank_candidates};
use super::{commit_transition, AssignTarget};
use crate::config::AssignmentConfig;
use crate::errors::{require_reason, DispatchError, Result};
use crate::orders::{
    apply_transition, transition_target, Actor, OrderAction, OrderActionKind, OrderStore,
    Transition, WorkOrder,
};
use crate::workers::{WorkerDirectory, WorkerId, WorkerSnapshot, WorkloadLedger};

/// Matches pending orders to workers and drives PENDING_ASSIGNMENT → ASSIGNING.
pub struct Assigner {
    directory: Arc<dyn WorkerDirectory>,
    workload: Arc<WorkloadLedger>,
    store: Arc<OrderStore>,
    settings: AssignmentConfig,
}

impl Assigner {
    pub fn new(
        directory: Arc<dyn WorkerDirectory>,
        workload: Arc<WorkloadLedger>,
        store: Arc<OrderStore>,
        settings: AssignmentConfig,
    ) -> Self {
        Self {
            directory,
            workload,
            store,
            settings,
        }
    }

    /// Binds `order` (read at its current version) to a worker and commits.
    pub async fn assign(
        &self,
        order: &WorkOrder,
        target: AssignTarget,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        if transition_target(order.status, OrderActionKind::Assign).is_none() {
            return Err(DispatchError::InvalidTransition {
                from: order.status,
                action: OrderActionKind::Assign,
            });
        }

        let (worker, actor) = match target {
            AssignTarget::Auto => (self.select_worker(order).await?, Actor::System),
            AssignTarget::Worker(worker_id) => (
                self.check_manual(order, &worker_id, None).await?,
                Actor::Supervisor,
            ),
            AssignTarget::Override {
                worker_id,
                justification,
            } => (
                self.check_manual(order, &worker_id, Some(&justification))
                    .await?,
                Actor::Supervisor,
            ),
        };

        let transition = apply_transition(
            order,
            OrderAction::Assign {
                worker_id: worker.id.clone(),
                actor,
            },
            now,
        )?;
        let transition = commit_transition(&self.store, &self.workload, order.version, transition)?;

        info!(
            order_id = %order.id,
            worker_id = %worker.id,
            live_status = %worker.live_status,
            open_assignments = self.workload.open_count(&worker.id),
            actor = %actor,
            "Work order assigned"
        );
        Ok(transition)
    }

    /// Best-ranked eligible worker for `order`, honoring the cool-down on
    /// the worker vacated by the last reassignment. The cool-down applies
    /// to the ranked, reachable candidates, so the previous worker is only
    /// dropped when someone usable is left.
    pub async fn select_worker(&self, order: &WorkOrder) -> Result<WorkerSnapshot> {
        let candidates = self.eligible_candidates(order).await?;
        let ranked = rank_candidates(candidates, self.settings.allow_offline_fallback);

        let ranked = match &order.cooldown_worker_id {
            Some(cooling) => {
                let (rest, previous): (Vec<_>, Vec<_>) =
                    ranked.into_iter().partition(|w| &w.id != cooling);
                if !rest.is_empty() || previous.is_empty() {
                    rest
                } else if self.settings.strict_cooldown {
                    warn!(
                        order_id = %order.id,
                        worker_id = %cooling,
                        "Only the previous worker is eligible and cool-down is strict"
                    );
                    Vec::new()
                } else {
                    warn!(
                        order_id = %order.id,
                        worker_id = %cooling,
                        "Cool-down waived: previous worker is the only candidate"
                    );
                    previous
                }
            }
            None => ranked,
        };

        ranked
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::NoEligibleWorker {
                category: order.category.clone(),
                area: order.area().to_string(),
            })
    }

    async fn eligible_candidates(&self, order: &WorkOrder) -> Result<Vec<WorkerSnapshot>> {
        let family = self.settings.skill_aliases.family(&order.category);
        let listed = self
            .directory
            .list_eligible(&family, order.area())
            .await
            .map_err(|e| DispatchError::DirectoryUnavailable(e.to_string()))?;

        // The directory is external; its filtering is re-checked here.
        Ok(listed
            .into_iter()
            .filter(|worker| is_eligible(worker, order, &self.settings.skill_aliases))
            .map(|worker| self.workload.overlay(worker))
            .collect())
    }

    async fn check_manual(
        &self,
        order: &WorkOrder,
        worker_id: &WorkerId,
        override_justification: Option<&str>,
    ) -> Result<WorkerSnapshot> {
        let justification = override_justification.map(require_reason).transpose()?;

        let worker = self
            .directory
            .get(worker_id)
            .await
            .map_err(|e| DispatchError::DirectoryUnavailable(e.to_string()))?
            .ok_or_else(|| DispatchError::worker_not_found(worker_id))?;

        if is_eligible(&worker, order, &self.settings.skill_aliases) {
            return Ok(self.workload.overlay(worker));
        }

        match justification {
            Some(justification) => {
                warn!(
                    order_id = %order.id,
                    worker_id = %worker_id,
                    category = %order.category,
                    area = %order.area(),
                    justification = %justification,
                    "Eligibility override: assigning worker outside skill/area match"
                );
                Ok(self.workload.overlay(worker))
            }
            None => Err(DispatchError::IneligibleWorker {
                order_id: order.id,
                worker_id: worker_id.clone(),
            }),
        }
    }
}

impl std::fmt::Debug for Assigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assigner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
