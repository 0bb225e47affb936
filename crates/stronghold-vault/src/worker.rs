//! End-to-end bootstrap run
//!
//! Coordinator first, then provisioning in a fixed order: policies and their
//! tokens, service credentials, TLS material. Every provisioning step is a
//! no-op against a store that already has what it would write.

use std::time::Duration;

use stronghold_common::RetryConfig;
use tracing::{info, warn};

use crate::certs::{CertificateUploader, UploadOutcome};
use crate::client::{HttpSecretStore, HttpStoreConfig, SecretStore};
use crate::config::WorkerConfig;
use crate::coordinator::{BootstrapCoordinator, BootstrapOutcome};
use crate::credentials::{service_credentials, CredentialSeeder};
use crate::init::{load_root_token, Initializer};
use crate::policy::PolicyImporter;
use crate::token::{TokenIssuer, TokenOutcome};
use crate::unseal::Unsealer;
use crate::Result;

/// Default seconds between health probes and upload attempts
pub const DEFAULT_WAIT_SECS: u64 = 30;

/// Run-time switches from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Whether bootstrapping was requested at all
    pub init: bool,
    /// Interval between health probes and between upload attempts
    pub wait: Duration,
    /// Log init responses and key shares
    pub debug: bool,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            init: false,
            wait: Duration::from_secs(DEFAULT_WAIT_SECS),
            debug: false,
        }
    }
}

/// How a worker run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// `init` was not set; the store was not contacted
    Skipped,
    /// The store is a standby node; nothing was provisioned
    Standby,
    /// The store is operational and provisioned
    Provisioned(ProvisionReport),
}

/// What a provisioning pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Tokens created in this run
    pub tokens_created: Vec<String>,
    /// Services whose credentials were written in this run
    pub credentials_written: Vec<&'static str>,
    /// Whether TLS material was uploaded in this run
    pub certificate_uploaded: bool,
}

fn skipped() -> WorkerOutcome {
    info!("bootstrap not requested; pass --init to initialize and unseal the secret store");
    WorkerOutcome::Skipped
}

/// Bootstrap and provision `store`
pub async fn run_worker<S: SecretStore + ?Sized>(
    config: &WorkerConfig,
    store: &S,
    options: WorkerOptions,
) -> Result<WorkerOutcome> {
    if !options.init {
        return Ok(skipped());
    }

    let init_file = config.init_file_path();
    let s = &config.secret_service;
    let mut coordinator = BootstrapCoordinator::new(
        store,
        Initializer::new(
            init_file.clone(),
            s.vault_secret_shares,
            s.vault_secret_threshold,
        )
        .with_debug(options.debug),
        Unsealer::new(init_file.clone()).with_debug(options.debug),
        options.wait,
    );

    match coordinator.run().await? {
        BootstrapOutcome::Standby => {
            warn!("standby node: skipping provisioning");
            return Ok(WorkerOutcome::Standby);
        }
        BootstrapOutcome::Operational => {}
    }

    let root_token = load_root_token(&init_file)?;
    let mut report = ProvisionReport::default();

    let policies = PolicyImporter::new(store, &root_token);
    let tokens = TokenIssuer::new(store, &root_token, &s.token_folder_path);
    for pair in config.policy_token_pairs() {
        policies.import(&pair.policy_name, &pair.policy_path).await?;
        if let TokenOutcome::Created(_) = tokens.create(&pair.token_name, &pair.policy_name).await? {
            report.tokens_created.push(pair.token_name.clone());
        }
    }

    report.credentials_written = CredentialSeeder::new(store, &root_token)
        .seed(&service_credentials(config))
        .await?;

    let upload = CertificateUploader::from_config(store, &root_token, config)
        .run(&RetryConfig::fixed(options.wait))
        .await?;
    report.certificate_uploaded = upload == UploadOutcome::Uploaded;

    info!(
        tokens = report.tokens_created.len(),
        credentials = report.credentials_written.len(),
        certificate = report.certificate_uploaded,
        "secret store provisioned"
    );
    Ok(WorkerOutcome::Provisioned(report))
}

/// Build the HTTP client from `config` and run the worker against it
pub async fn run(
    config: &WorkerConfig,
    options: WorkerOptions,
    insecure_skip_verify: bool,
) -> Result<WorkerOutcome> {
    if !options.init {
        return Ok(skipped());
    }
    let store = HttpSecretStore::new(&HttpStoreConfig::from_worker(config, insecure_skip_verify))?;
    info!(url = %config.base_url(), "secret store client ready");
    run_worker(config, &store, options).await
}
