//! Secret store bootstrap
//!
//! Drives a Vault-compatible store from "never initialized" to operational
//! and provisioned:
//!
//! - [`coordinator`] - Health polling state machine running init and unseal
//! - [`init`] / [`unseal`] - Shamir share generation, persistence and submission
//! - [`policy`] / [`token`] - Policy import and policy-bound token creation
//! - [`credentials`] - Per-service database credentials
//! - [`certs`] - Upload of the gateway's TLS material
//! - [`worker`] - The full run, in order
//!
//! All store traffic goes through the [`SecretStore`] trait so the bootstrap
//! logic can be driven by a mock in tests.

#![deny(missing_docs)]

pub mod certs;
pub mod client;
pub mod config;
pub mod coordinator;
pub mod credentials;
mod error;
pub mod init;
pub mod policy;
pub mod state;
pub mod token;
pub mod unseal;
pub mod worker;

pub use certs::{CertPair, CertificateUploader, UploadOutcome};
pub use client::{HttpSecretStore, HttpStoreConfig, SecretStore, StoreResponse};
pub use config::{PolicyTokenPair, SecretServiceConfig, WorkerConfig};
pub use coordinator::{BootstrapCoordinator, BootstrapOutcome};
pub use credentials::{generate_password, CredentialSeeder, ServiceCredential, UserPasswd};
pub use error::{Error, Result};
pub use init::{load_root_token, InitResponse, Initializer};
pub use policy::{policy_body, ImportOutcome, PolicyImporter};
pub use state::{transition, Action, BootstrapState, Probe};
pub use token::{TokenIssuer, TokenOutcome};
pub use unseal::Unsealer;
pub use worker::{run, run_worker, ProvisionReport, WorkerOptions, WorkerOutcome};
