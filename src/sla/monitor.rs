use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::policy::{SlaPolicy, SlaTier};
use crate::orders::{OrderId, OrderStatus, WorkOrder};

/// Tier per order plus the tier histogram shown on the dispatch dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlaReport {
    pub evaluated_at: DateTime<Utc>,
    pub per_order: HashMap<OrderId, SlaTier>,
    /// Always carries all four tiers, zero-filled.
    pub counts: BTreeMap<SlaTier, usize>,
}

impl SlaReport {
    pub fn tier_of(&self, order_id: OrderId) -> Option<SlaTier> {
        self.per_order.get(&order_id).copied()
    }

    pub fn count(&self, tier: SlaTier) -> usize {
        self.counts.get(&tier).copied().unwrap_or(0)
    }
}

/// Pull-based SLA classifier. Holds no schedule state: every call
/// recomputes from the orders' own timestamps and the `now` it is given.
#[derive(Debug, Clone)]
pub struct SlaMonitor {
    policy: SlaPolicy,
}

impl SlaMonitor {
    pub fn new(policy: SlaPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SlaPolicy {
        &self.policy
    }

    pub fn tier_for(&self, order: &WorkOrder, now: DateTime<Utc>) -> SlaTier {
        self.policy.tier_for(order, now)
    }

    pub fn classify(&self, open_orders: &[WorkOrder], now: DateTime<Utc>) -> SlaReport {
        let mut counts: BTreeMap<SlaTier, usize> =
            SlaTier::ALL.iter().map(|tier| (*tier, 0)).collect();
        let mut per_order = HashMap::with_capacity(open_orders.len());

        for order in open_orders {
            let tier = self.policy.tier_for(order, now);
            per_order.insert(order.id, tier);
            *counts.entry(tier).or_insert(0) += 1;
        }

        debug!(
            orders = open_orders.len(),
            critical = counts.get(&SlaTier::Critical).copied().unwrap_or(0),
            "SLA classification complete"
        );

        SlaReport {
            evaluated_at: now,
            per_order,
            counts,
        }
    }

    /// Orders stuck waiting for a worker's answer long enough to be
    /// CRITICAL. These feed timeout escalation.
    pub fn escalation_candidates<'a>(
        &self,
        report: &SlaReport,
        orders: &'a [WorkOrder],
    ) -> Vec<&'a WorkOrder> {
        orders
            .iter()
            .filter(|order| order.status == OrderStatus::Assigning)
            .filter(|order| report.tier_of(order.id) == Some(SlaTier::Critical))
            .collect()
    }
}
