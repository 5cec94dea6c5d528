use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

use super::types::{OrderId, WorkOrder};
use crate::errors::{DispatchError, Result};

/// Id-keyed repository of work orders owned by the engine.
///
/// Writers never hold the lock across an await point or a computation: they
/// read a copy, compute the next state, and commit with [`OrderStore::commit`],
/// which only succeeds if nobody else committed in between.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<OrderId, WorkOrder>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: WorkOrder) {
        self.orders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(order.id, order);
    }

    pub fn get(&self, id: OrderId) -> Result<WorkOrder> {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| DispatchError::order_not_found(id))
    }

    /// Reads an order and checks that the caller's version token is current.
    pub fn get_at_version(&self, id: OrderId, expected_version: u64) -> Result<WorkOrder> {
        let order = self.get(id)?;
        if order.version != expected_version {
            return Err(DispatchError::ConcurrentModification {
                order_id: id,
                expected: expected_version,
                actual: order.version,
            });
        }
        Ok(order)
    }

    /// Replaces the stored order if its version still equals
    /// `expected_version`.
    pub fn commit(&self, expected_version: u64, order: WorkOrder) -> Result<WorkOrder> {
        let mut orders = self.orders.write().unwrap_or_else(PoisonError::into_inner);
        let stored = orders
            .get_mut(&order.id)
            .ok_or_else(|| DispatchError::order_not_found(order.id))?;
        if stored.version != expected_version {
            debug!(
                order_id = %order.id,
                expected = expected_version,
                actual = stored.version,
                "Rejected stale order write"
            );
            return Err(DispatchError::ConcurrentModification {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }
        *stored = order.clone();
        Ok(order)
    }

    /// Copies of every order matching `predicate`, oldest first.
    pub fn select<F>(&self, predicate: F) -> Vec<WorkOrder>
    where
        F: Fn(&WorkOrder) -> bool,
    {
        let mut selected: Vec<WorkOrder> = self
            .orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|order| predicate(order))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        selected
    }

    pub fn len(&self) -> usize {
        self.orders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::types::{CustomerContact, NewWorkOrder, ProjectAddress, VisitKind};
    use chrono::Utc;

    fn order() -> WorkOrder {
        WorkOrder::create(
            NewWorkOrder {
                kind: VisitKind::Installation,
                category: "curtain".into(),
                customer: CustomerContact {
                    name: "Wang".into(),
                    phone: "13900000000".into(),
                },
                address: ProjectAddress {
                    area: "上海市-普陀区".into(),
                    detail: "No. 8".into(),
                },
                scheduled_at: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn commit_with_stale_version_is_rejected() {
        let store = OrderStore::new();
        let original = order();
        store.insert(original.clone());

        let mut first = original.clone();
        first.version += 1;
        store.commit(original.version, first).unwrap();

        let mut second = original.clone();
        second.version += 1;
        let err = store.commit(original.version, second).unwrap_err();
        assert_eq!(
            err,
            DispatchError::ConcurrentModification {
                order_id: original.id,
                expected: 1,
                actual: 2
            }
        );
    }

    #[test]
    fn unknown_orders_are_not_found() {
        let store = OrderStore::new();
        let missing = order();
        assert!(matches!(
            store.get(missing.id),
            Err(DispatchError::NotFound { .. })
        ));
        assert!(matches!(
            store.commit(1, missing),
            Err(DispatchError::NotFound { .. })
        ));
    }
}
