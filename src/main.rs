//! Stronghold binary

use clap::Parser;
use stronghold_common::{init_telemetry, TelemetryConfig};

use stronghold::Cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let telemetry = TelemetryConfig {
        json: cli.log_json,
        log_file: cli.log_file.clone(),
        ..Default::default()
    };
    let _guard = match init_telemetry(&telemetry) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    match cli.run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
