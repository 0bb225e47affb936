//! Stronghold command line
//!
//! Two independent runs share one binary:
//!
//! - `stronghold pki` issues the root CA and the TLS server certificate
//! - `stronghold vault` initializes, unseals and provisions the secret store

pub mod commands;

use clap::{Parser, Subcommand};

/// Stronghold - secret store bootstrap and private PKI
#[derive(Parser, Debug)]
#[command(name = "stronghold")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "STRONGHOLD_LOG_JSON")]
    pub log_json: bool,

    /// Also append logs to this file
    #[arg(long, global = true, env = "STRONGHOLD_LOG_FILE")]
    pub log_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Issue the root CA (when requested) and the TLS server certificate
    Pki(commands::pki::PkiArgs),
    /// Bootstrap and provision the secret store
    Vault(commands::vault::VaultArgs),
}

impl Cli {
    /// Run the selected command
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Commands::Pki(args) => commands::pki::run(args),
            Commands::Vault(args) => commands::vault::run(args).await,
        }
    }
}
