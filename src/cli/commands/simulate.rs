use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use super::{print_json, tier_badge, Command};
use crate::config::DispatchConfig;
use crate::dispatch::{AssignTarget, DispatchEngine, OrderFilter, OrderView};
use crate::errors::ErrorKind;
use crate::orders::{NewWorkOrder, OrderId};
use crate::sinks::MemoryNotificationGateway;
use crate::workers::{InMemoryWorkerDirectory, WorkerSnapshot};

/// Workers and orders to replay through the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct Fixture {
    pub workers: Vec<WorkerSnapshot>,
    pub orders: Vec<NewWorkOrder>,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub assigned: Vec<OrderView>,
    pub unassigned: Vec<(OrderId, ErrorKind)>,
    pub notifications_sent: usize,
}

pub struct SimulateCommand {
    config: DispatchConfig,
    fixture_path: PathBuf,
    json: bool,
}

impl SimulateCommand {
    pub fn new(config: DispatchConfig, fixture_path: PathBuf) -> Self {
        Self {
            config,
            fixture_path,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Seeds an in-memory engine from the fixture and auto-assigns each
    /// order once, in file order.
    pub async fn run(&self) -> Result<SimulationReport> {
        let content = std::fs::read_to_string(&self.fixture_path)
            .with_context(|| format!("Failed to read {}", self.fixture_path.display()))?;
        let fixture: Fixture = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a valid fixture", self.fixture_path.display()))?;

        let notifier = Arc::new(MemoryNotificationGateway::new());
        let engine = DispatchEngine::builder(Arc::new(InMemoryWorkerDirectory::new(fixture.workers)))
            .notifier(notifier.clone())
            .config(self.config.clone())
            .build()?;

        let mut unassigned = Vec::new();
        for details in fixture.orders {
            let created = engine.create_order(details).await?;
            if let Err(e) = engine
                .assign(created.order.id, created.order.version, AssignTarget::Auto)
                .await
            {
                unassigned.push((created.order.id, e.kind()));
            }
        }
        engine.shutdown().await;

        let assigned = engine
            .list_with_sla(&OrderFilter::default())
            .into_iter()
            .filter(|view| view.order.assigned_worker_id.is_some())
            .collect();

        Ok(SimulationReport {
            assigned,
            unassigned,
            notifications_sent: notifier.sent().len(),
        })
    }
}

impl Command for SimulateCommand {
    async fn execute(&self) -> Result<()> {
        let report = self.run().await?;

        if self.json {
            return print_json(&report);
        }

        println!("🧪 Simulated auto-assignment");
        println!();
        for view in &report.assigned {
            let worker = view
                .order
                .assigned_worker_id
                .as_ref()
                .map(|w| w.to_string())
                .unwrap_or_default();
            println!(
                "   {} {} {:<10} {:<16} → {}",
                tier_badge(view.tier),
                view.order.id,
                view.order.category,
                view.order.area(),
                worker
            );
        }
        for (order_id, kind) in &report.unassigned {
            println!("   ❌ {order_id} {kind}");
        }
        println!();
        println!(
            "📊 {} assigned, {} unassigned, {} offers sent",
            report.assigned.len(),
            report.unassigned.len(),
            report.notifications_sent
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn demo_fixture_assigns_what_it_can() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/fixture.json");
        let report = SimulateCommand::new(DispatchConfig::default(), path)
            .run()
            .await
            .unwrap();

        assert_eq!(report.assigned.len(), 3);
        assert_eq!(report.unassigned.len(), 1);
        assert_eq!(report.unassigned[0].1, ErrorKind::NoEligibleWorker);
        assert_eq!(report.notifications_sent, 3);
    }
}
