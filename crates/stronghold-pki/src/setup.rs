//! PKI setup run: directory preparation, root CA, TLS server certificate

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::authority::{CertificateAuthority, CertificateInfo};
use crate::config::PkiSetup;
use crate::keys::KeyMaterial;
use crate::{PkiError, Result};

/// Mode of a freshly created CA directory
pub const CA_DIR_MODE: u32 = 0o750;

/// Files produced by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiOutput {
    /// Root CA certificate (new or pre-existing)
    pub ca_cert_file: PathBuf,
    /// Root CA private key (new or pre-existing)
    pub ca_key_file: PathBuf,
    /// TLS server certificate
    pub tls_cert_file: PathBuf,
    /// TLS server private key
    pub tls_key_file: PathBuf,
    /// Whether a new root CA was created in this run
    pub created_ca: bool,
}

impl PkiSetup {
    /// Make the CA directory ready
    ///
    /// With `new_ca` the directory and everything under it is deleted and
    /// recreated. Otherwise it must already exist and be a directory.
    pub fn prepare_directory(&self) -> Result<()> {
        if self.new_ca {
            warn!(
                dir = %self.ca_dir.display(),
                "new root CA requested: deleting the CA directory and all key material in it"
            );
            match std::fs::remove_dir_all(&self.ca_dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(PkiError::io(&self.ca_dir, e)),
            }
            create_ca_dir(&self.ca_dir)?;
            info!(dir = %self.ca_dir.display(), "created CA directory");
            return Ok(());
        }

        let meta = std::fs::metadata(&self.ca_dir).map_err(|e| PkiError::io(&self.ca_dir, e))?;
        if !meta.is_dir() {
            return Err(PkiError::io(
                &self.ca_dir,
                std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            ));
        }
        info!(dir = %self.ca_dir.display(), "using existing CA directory");
        Ok(())
    }

    /// Run the whole setup: directory, root CA if requested, TLS server leaf
    pub fn run(&self) -> Result<PkiOutput> {
        self.prepare_directory()?;

        if self.new_ca {
            let key = KeyMaterial::generate(self.scheme)?;
            let ca = CertificateAuthority::issue_root(&self.ca_subject, &self.ca_email, key)?;
            ca.persist(&self.ca_key_file, &self.ca_cert_file)?;
            self.dump_public_key("root CA", &ca.info()?);
            info!(cert = %self.ca_cert_file.display(), "root CA written");
        }

        let ca = CertificateAuthority::load(&self.ca_cert_file, &self.ca_key_file)?;
        let leaf = ca.issue_leaf(&self.server_request(), self.scheme)?;
        leaf.persist(&self.tls_key_file, &self.tls_cert_file)?;
        self.dump_public_key("TLS server", &leaf.info()?);
        info!(
            cert = %self.tls_cert_file.display(),
            fqdn = %self.tls_fqdn,
            "TLS server certificate written"
        );

        Ok(PkiOutput {
            ca_cert_file: self.ca_cert_file.clone(),
            ca_key_file: self.ca_key_file.clone(),
            tls_cert_file: self.tls_cert_file.clone(),
            tls_key_file: self.tls_key_file.clone(),
            created_ca: self.new_ca,
        })
    }

    fn dump_public_key(&self, role: &str, info: &CertificateInfo) {
        if !self.dump_keys {
            return;
        }
        debug!(
            role,
            subject = %info.subject,
            serial = %info.serial_hex(),
            public_key = %info.public_key_pem(),
            "generated key"
        );
    }
}

#[cfg(unix)]
fn create_ca_dir(dir: &std::path::Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(CA_DIR_MODE)
        .create(dir)
        .map_err(|e| PkiError::io(dir, e))
}

#[cfg(not(unix))]
fn create_ca_dir(dir: &std::path::Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PkiError::io(dir, e))
}
