use anyhow::Result;
use clap::Parser;

use field_dispatch::cli::commands::{
    show_how_to_get_started, ClassifyCommand, Command, SimulateCommand, ThresholdsCommand,
};
use field_dispatch::cli::{Cli, Commands};
use field_dispatch::{config, init_config, init_telemetry, shutdown_telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_config()?;
    let settings = config()?.clone();
    init_telemetry(&settings.observability)?;

    let result = match cli.command {
        None => show_how_to_get_started(&settings),
        Some(Commands::Thresholds) => {
            ThresholdsCommand::new(settings)
                .with_json(cli.json)
                .execute()
                .await
        }
        Some(Commands::Classify { orders, now }) => {
            ClassifyCommand::new(settings, orders)
                .with_now(now)
                .with_json(cli.json)
                .execute()
                .await
        }
        Some(Commands::Simulate { fixture }) => {
            SimulateCommand::new(settings, fixture)
                .with_json(cli.json)
                .execute()
                .await
        }
    };

    shutdown_telemetry();
    result
}
