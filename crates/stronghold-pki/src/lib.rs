//! Private PKI for service TLS
//!
//! Issues a self-signed root CA and CA-signed TLS server certificates over
//! RSA (2048 to 8192 bits) or NIST P-224, P-256, P-384 and P-521 keys.
//!
//! # Flow
//!
//! 1. [`X509Config`] is read from JSON and resolved into a [`PkiSetup`]; the
//!    key scheme and every name are validated here, before any I/O.
//! 2. [`PkiSetup::run`] prepares the CA directory (wiping it when a new root
//!    is requested), issues the root if needed, then loads it back from PEM
//!    and issues the server leaf.

pub mod authority;
pub mod config;
mod error;
pub mod keys;
pub mod scheme;
pub mod setup;
mod x509;

pub use authority::{
    persist_material, verify_issued_by, CertificateAuthority, CertificateInfo,
    CertificateRequest, IssuedCertificate, Subject,
};
pub use config::{PkiSetup, X509Config};
pub use error::{PkiError, Result};
pub use keys::{generate_key_pair, KeyMaterial};
pub use scheme::{EcCurve, KeyScheme};
pub use setup::PkiOutput;
