use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

#[derive(Parser)]
#[command(name = "field-dispatch")]
#[command(about = "Work-order dispatch and SLA tracking for field measurement and installation crews")]
#[command(long_about = "field-dispatch matches measurement and installation work orders to field workers, \
                       tracks every order through its visit lifecycle and rates how long each one has \
                       been waiting. Start with 'field-dispatch thresholds' to see the SLA table in effect.")]
pub struct Cli {
    /// Emit machine-readable JSON instead of the formatted report
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the SLA threshold table in effect
    Thresholds,
    /// Rate a set of work orders against the SLA table
    Classify {
        /// JSON file holding an array of work orders
        #[arg(long, help = "Path to a JSON array of work orders")]
        orders: PathBuf,
        /// Evaluation time (RFC 3339); defaults to the current time
        #[arg(long, help = "Evaluate as of this RFC 3339 timestamp")]
        now: Option<String>,
    },
    /// Load workers and orders from a fixture and auto-assign every order
    Simulate {
        /// JSON fixture with "workers" and "orders" arrays
        #[arg(long, help = "Path to a JSON fixture with workers and orders")]
        fixture: PathBuf,
    },
}
