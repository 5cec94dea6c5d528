//! Shared builders for the integration tests: workers, order details and an
//! engine wired to in-memory sinks and a manual clock.
#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use field_dispatch::clock::ManualClock;
use field_dispatch::orders::{CustomerContact, NewWorkOrder, ProjectAddress, VisitKind};
use field_dispatch::sinks::{MemoryAuditTrail, MemoryNotificationGateway};
use field_dispatch::workers::InMemoryWorkerDirectory;
use field_dispatch::{
    AssignTarget, DispatchConfig, DispatchEngine, LiveStatus, OrderView, WorkerId, WorkerSnapshot,
};

pub const PUTUO: &str = "上海市-普陀区";
pub const JINGAN: &str = "上海市-静安区";

pub fn worker(
    id: &str,
    skills: &[&str],
    areas: &[&str],
    status: LiveStatus,
    accept_rate: f64,
) -> WorkerSnapshot {
    WorkerSnapshot {
        id: WorkerId::from(id),
        name: format!("Worker {id}"),
        skill_categories: skills.iter().map(|s| s.to_string()).collect(),
        service_areas: areas.iter().map(|a| a.to_string()).collect(),
        live_status: status,
        open_assignment_count: 0,
        historical_accept_rate: accept_rate,
        average_response_minutes: 30.0,
    }
}

/// An ONLINE curtain worker serving Putuo.
pub fn curtain_worker(id: &str, accept_rate: f64) -> WorkerSnapshot {
    worker(id, &["curtain"], &[PUTUO], LiveStatus::Online, accept_rate)
}

pub fn order_details(category: &str, area: &str) -> NewWorkOrder {
    NewWorkOrder {
        kind: VisitKind::Measurement,
        category: category.to_string(),
        customer: CustomerContact {
            name: "Chen Jing".into(),
            phone: "13800001111".into(),
        },
        address: ProjectAddress {
            area: area.to_string(),
            detail: "Lane 88, No. 12".into(),
        },
        scheduled_at: None,
    }
}

pub struct TestEngine {
    pub engine: Arc<DispatchEngine>,
    pub clock: Arc<ManualClock>,
    pub audit: Arc<MemoryAuditTrail>,
    pub notifier: Arc<MemoryNotificationGateway>,
    pub directory: Arc<InMemoryWorkerDirectory>,
}

pub fn engine_with(workers: Vec<WorkerSnapshot>) -> TestEngine {
    engine_with_config(workers, DispatchConfig::default())
}

pub fn engine_with_config(workers: Vec<WorkerSnapshot>, config: DispatchConfig) -> TestEngine {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 1, 0, 0).unwrap(),
    ));
    let audit = Arc::new(MemoryAuditTrail::new());
    let notifier = Arc::new(MemoryNotificationGateway::new());
    let directory = Arc::new(InMemoryWorkerDirectory::new(workers));
    let engine = DispatchEngine::builder(directory.clone())
        .audit_trail(audit.clone())
        .notifier(notifier.clone())
        .clock(clock.clone())
        .config(config)
        .build()
        .expect("default thresholds are valid");
    TestEngine {
        engine: Arc::new(engine),
        clock,
        audit,
        notifier,
        directory,
    }
}

impl TestEngine {
    pub async fn create(&self, category: &str, area: &str) -> OrderView {
        self.engine
            .create_order(order_details(category, area))
            .await
            .expect("create order")
    }

    /// Creates a curtain order in Putuo and auto-assigns it.
    pub async fn create_assigned(&self) -> OrderView {
        let created = self.create("curtain", PUTUO).await;
        self.engine
            .assign(created.order.id, created.order.version, AssignTarget::Auto)
            .await
            .expect("auto assign")
    }
}
