use anyhow::Result;

use crate::config::DispatchConfig;
use crate::sla::SlaTier;

pub mod classify;
pub mod simulate;
pub mod thresholds;

pub use classify::ClassifyCommand;
pub use simulate::SimulateCommand;
pub use thresholds::ThresholdsCommand;

#[allow(async_fn_in_trait)]
pub trait Command {
    async fn execute(&self) -> Result<()>;
}

pub(crate) fn tier_badge(tier: SlaTier) -> &'static str {
    match tier {
        SlaTier::Normal => "🟢",
        SlaTier::Attention => "🟡",
        SlaTier::Overdue => "🟠",
        SlaTier::Critical => "🔴",
    }
}

pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn show_how_to_get_started(config: &DispatchConfig) -> Result<()> {
    println!("🧰 field-dispatch - work-order dispatch for field crews");
    println!();
    println!("Commands:");
    println!("  📏 field-dispatch thresholds                 # SLA table in effect");
    println!("  🩺 field-dispatch classify --orders <file>   # Rate orders against the table");
    println!("  🧪 field-dispatch simulate --fixture <file>  # Dry-run auto-assignment");
    println!();
    println!(
        "⚙️  {} statuses configured, notifications {}",
        config.sla.configured().count(),
        if config.notifications.enabled {
            "on"
        } else {
            "off"
        }
    );
    Ok(())
}
