//! PKI setup command

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use tracing::info;

use stronghold_pki::{PkiSetup, X509Config};

#[derive(Args, Debug)]
pub struct PkiArgs {
    /// PKI setup JSON file
    #[arg(short, long, env = "STRONGHOLD_PKI_CONFIG", default_value = "pkisetup-vault.json")]
    pub config: PathBuf,
}

pub fn run(args: PkiArgs) -> anyhow::Result<()> {
    let config = X509Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    if config.dump_config {
        config.dump();
    }

    let setup = PkiSetup::from_config(&config)?;
    info!(setup = %setup, "starting PKI setup");

    let output = setup.run()?;
    info!(
        ca = %output.ca_cert_file.display(),
        tls = %output.tls_cert_file.display(),
        created_ca = output.created_ca,
        "PKI setup complete"
    );
    Ok(())
}
