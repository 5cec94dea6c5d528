use anyhow::Result;
use serde::Serialize;

use super::{print_json, Command};
use crate::config::{DispatchConfig, ThresholdHours};
use crate::orders::OrderStatus;

pub struct ThresholdsCommand {
    config: DispatchConfig,
    json: bool,
}

#[derive(Debug, Serialize)]
struct ThresholdRow {
    status: OrderStatus,
    #[serde(flatten)]
    hours: Option<ThresholdHours>,
}

impl ThresholdsCommand {
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            config,
            json: false,
        }
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn rows(&self) -> Vec<ThresholdRow> {
        OrderStatus::ALL
            .into_iter()
            .filter(|status| status.is_open())
            .map(|status| ThresholdRow {
                status,
                hours: self.config.sla.get(status),
            })
            .collect()
    }
}

impl Command for ThresholdsCommand {
    async fn execute(&self) -> Result<()> {
        // Reject a malformed table here rather than printing it.
        self.config.sla.policy()?;

        if self.json {
            return print_json(&self.rows());
        }

        println!("📏 SLA thresholds (hours in status)");
        println!();
        println!(
            "   {:<22} {:>10} {:>10} {:>10}",
            "STATUS", "ATTENTION", "OVERDUE", "CRITICAL"
        );
        for row in self.rows() {
            match row.hours {
                Some(hours) => println!(
                    "   {:<22} {:>10} {:>10} {:>10}",
                    row.status.as_str(),
                    format!(">{}", hours.attention),
                    format!(">{}", hours.overdue),
                    format!(">{}", hours.critical)
                ),
                None => println!(
                    "   {:<22} {:>32}",
                    row.status.as_str(),
                    "not configured (always NORMAL)"
                ),
            }
        }
        println!();
        println!("💡 PENDING_VISIT is measured from the scheduled visit time when one is set");
        Ok(())
    }
}
