use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

use super::types::{LiveStatus, WorkerId, WorkerSnapshot};

/// Read-only view of the external worker pool.
///
/// Implementations own worker identity, skills, areas and presence. The
/// dispatch engine never writes through this trait; open assignment counts
/// live in [`super::WorkloadLedger`].
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait WorkerDirectory: Send + Sync {
    /// Workers whose skills cover `category` and who serve `area`.
    async fn list_eligible(&self, category: &str, area: &str) -> Result<Vec<WorkerSnapshot>>;

    /// Single worker lookup, used by supervisor assignment.
    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerSnapshot>>;
}

/// Directory backed by a process-local map. Serves the CLI simulator and
/// tests, and doubles as a cache adapter in front of a remote directory.
#[derive(Debug, Default)]
pub struct InMemoryWorkerDirectory {
    workers: RwLock<BTreeMap<WorkerId, WorkerSnapshot>>,
}

impl InMemoryWorkerDirectory {
    pub fn new(workers: impl IntoIterator<Item = WorkerSnapshot>) -> Self {
        let workers = workers
            .into_iter()
            .map(|worker| (worker.id.clone(), worker))
            .collect();
        Self {
            workers: RwLock::new(workers),
        }
    }

    pub fn upsert(&self, worker: WorkerSnapshot) {
        self.workers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker.id.clone(), worker);
    }

    /// Returns false when the worker is unknown.
    pub fn set_live_status(&self, worker_id: &WorkerId, status: LiveStatus) -> bool {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        match workers.get_mut(worker_id) {
            Some(worker) => {
                worker.live_status = status;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl WorkerDirectory for InMemoryWorkerDirectory {
    async fn list_eligible(&self, category: &str, area: &str) -> Result<Vec<WorkerSnapshot>> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(workers
            .values()
            .filter(|worker| worker.serves(category, area))
            .cloned()
            .collect())
    }

    async fn get(&self, worker_id: &WorkerId) -> Result<Option<WorkerSnapshot>> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        Ok(workers.get(worker_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: &str, skill: &str, area: &str) -> WorkerSnapshot {
        WorkerSnapshot {
            id: WorkerId::from(id),
            name: id.to_uppercase(),
            skill_categories: [skill.to_string()].into_iter().collect(),
            service_areas: [area.to_string()].into_iter().collect(),
            live_status: LiveStatus::Online,
            open_assignment_count: 0,
            historical_accept_rate: 0.8,
            average_response_minutes: 20.0,
        }
    }

    #[tokio::test]
    async fn list_eligible_filters_on_category_and_area() {
        let directory = InMemoryWorkerDirectory::new(vec![
            snapshot("w1", "curtain", "上海市-普陀区"),
            snapshot("w2", "curtain", "上海市-静安区"),
            snapshot("w3", "wallcloth", "上海市-普陀区"),
        ]);

        let eligible = directory
            .list_eligible("curtain", "上海市-普陀区")
            .await
            .unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, WorkerId::from("w1"));
    }

    #[tokio::test]
    async fn live_status_updates_are_visible_to_readers() {
        let directory = InMemoryWorkerDirectory::new(vec![snapshot("w1", "curtain", "a")]);
        assert!(directory.set_live_status(&WorkerId::from("w1"), LiveStatus::Offline));
        assert!(!directory.set_live_status(&WorkerId::from("ghost"), LiveStatus::Offline));

        let worker = directory.get(&WorkerId::from("w1")).await.unwrap().unwrap();
        assert_eq!(worker.live_status, LiveStatus::Offline);
    }
}
