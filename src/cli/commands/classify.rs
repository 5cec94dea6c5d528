use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::{print_json, tier_badge, Command};
use crate::config::DispatchConfig;
use crate::orders::WorkOrder;
use crate::sla::{SlaMonitor, SlaReport, SlaTier};

pub struct ClassifyCommand {
    config: DispatchConfig,
    orders_path: PathBuf,
    now: Option<String>,
    json: bool,
}

impl ClassifyCommand {
    pub fn new(config: DispatchConfig, orders_path: PathBuf) -> Self {
        Self {
            config,
            orders_path,
            now: None,
            json: false,
        }
    }

    pub fn with_now(mut self, now: Option<String>) -> Self {
        self.now = now;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn evaluation_time(&self) -> Result<DateTime<Utc>> {
        match &self.now {
            Some(raw) => Ok(DateTime::parse_from_rfc3339(raw)
                .with_context(|| format!("--now is not an RFC 3339 timestamp: {raw}"))?
                .with_timezone(&Utc)),
            None => Ok(Utc::now()),
        }
    }

    /// Reads the orders file and classifies its open orders.
    pub fn report(&self) -> Result<(Vec<WorkOrder>, SlaReport)> {
        let content = std::fs::read_to_string(&self.orders_path)
            .with_context(|| format!("Failed to read {}", self.orders_path.display()))?;
        let orders: Vec<WorkOrder> = serde_json::from_str(&content)
            .with_context(|| format!("{} is not a JSON array of work orders", self.orders_path.display()))?;

        let open: Vec<WorkOrder> = orders
            .into_iter()
            .filter(|order| order.status.is_open())
            .collect();
        let monitor = SlaMonitor::new(self.config.sla.policy()?);
        let report = monitor.classify(&open, self.evaluation_time()?);
        Ok((open, report))
    }
}

impl Command for ClassifyCommand {
    async fn execute(&self) -> Result<()> {
        let (open, report) = self.report()?;

        if self.json {
            return print_json(&report);
        }

        println!("🩺 SLA classification as of {}", report.evaluated_at.to_rfc3339());
        println!();
        for tier in SlaTier::ALL {
            println!("   {} {:<10} {}", tier_badge(tier), tier.to_string(), report.count(tier));
        }

        let mut flagged: Vec<_> = open
            .iter()
            .filter_map(|order| report.tier_of(order.id).map(|tier| (tier, order)))
            .filter(|(tier, _)| *tier >= SlaTier::Overdue)
            .collect();
        flagged.sort_by(|a, b| b.0.cmp(&a.0));

        if !flagged.is_empty() {
            println!();
            println!("⚠️  Needs attention:");
            for (tier, order) in flagged {
                println!(
                    "   {} {} {:<22} {}",
                    tier_badge(tier),
                    order.id,
                    order.status.as_str(),
                    order.area()
                );
            }
        }
        Ok(())
    }
}
