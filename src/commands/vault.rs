//! Secret store bootstrap command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::info;

use stronghold_vault::worker::DEFAULT_WAIT_SECS;
use stronghold_vault::{WorkerConfig, WorkerOptions, WorkerOutcome};

#[derive(Args, Debug)]
pub struct VaultArgs {
    /// Worker TOML configuration
    #[arg(short, long, env = "STRONGHOLD_VAULT_CONFIG", default_value = "res/configuration.toml")]
    pub config: PathBuf,

    /// Initialize and unseal the store; without it the command only logs a hint
    #[arg(long)]
    pub init: bool,

    /// Seconds between health probes and between upload attempts
    #[arg(long, default_value_t = DEFAULT_WAIT_SECS)]
    pub wait: u64,

    /// Skip verification of the store's TLS certificate
    #[arg(
        long,
        env = "STRONGHOLD_INSECURE_SKIP_VERIFY",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub insecure_skip_verify: bool,

    /// Log init responses and key shares
    #[arg(long)]
    pub debug: bool,
}

impl VaultArgs {
    pub fn options(&self) -> WorkerOptions {
        WorkerOptions {
            init: self.init,
            wait: Duration::from_secs(self.wait),
            debug: self.debug,
        }
    }
}

pub async fn run(args: VaultArgs) -> anyhow::Result<()> {
    let config = WorkerConfig::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    let outcome =
        stronghold_vault::run(&config, args.options(), args.insecure_skip_verify).await?;
    match outcome {
        WorkerOutcome::Skipped => {}
        WorkerOutcome::Standby => info!("secret store is a standby node, nothing to do"),
        WorkerOutcome::Provisioned(report) => info!(
            tokens = report.tokens_created.len(),
            credentials = report.credentials_written.len(),
            certificate = report.certificate_uploaded,
            "secret store bootstrap complete"
        ),
    }
    Ok(())
}
