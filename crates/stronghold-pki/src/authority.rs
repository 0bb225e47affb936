//! Root CA and leaf certificate issuance
//!
//! The root is self-signed with a single path-length-zero constraint and may
//! only sign certificates. Leaves are TLS server certificates carrying their
//! own key pair, signed by the root's key after loading it back from PEM.
//!
//! # Files
//!
//! - private keys: PKCS#8 PEM, owner read-only (0400)
//! - certificates: X.509 PEM, world readable (0644)

use std::path::Path;

use rcgen::{
    string::Ia5String, BasicConstraints, CertificateParams, DistinguishedName, DnType, DnValue,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyIdMethod, KeyUsagePurpose, SanType, SerialNumber,
};
use stronghold_common::{write_with_mode, PRIVATE_KEY_MODE, PUBLIC_FILE_MODE};
use tracing::{debug, info};
use x509_parser::prelude::*;

use crate::keys::{
    encode_pem, parse_pem, KeyMaterial, CERTIFICATE_LABEL, PUBLIC_KEY_LABEL,
};
use crate::scheme::KeyScheme;
use crate::{x509, PkiError, Result};

/// Validity period for the root CA certificate
pub const CA_VALIDITY_YEARS: i32 = 10;

/// Validity period for leaf certificates
pub const CERT_VALIDITY_YEARS: i32 = 10;

/// Serial numbers are this many random bytes
const SERIAL_BYTES: usize = 16;

/// Compute (not_before, not_after) starting now
fn compute_validity(years: i32) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    // Feb 29 has no counterpart in most target years
    let not_after = now
        .replace_year(now.year() + years)
        .unwrap_or_else(|_| now + ::time::Duration::days(i64::from(years) * 365 + 2));
    (now, not_after)
}

/// Uniformly random 128-bit serial, never zero
fn random_serial() -> Result<[u8; SERIAL_BYTES]> {
    let mut bytes = [0u8; SERIAL_BYTES];
    aws_lc_rs::rand::fill(&mut bytes).map_err(|_| {
        PkiError::CertificateGenerationFailed("failed to generate serial number".to_string())
    })?;
    if bytes.iter().all(|b| *b == 0) {
        bytes[SERIAL_BYTES - 1] = 1;
    }
    Ok(bytes)
}

fn ia5(value: &str, what: &str) -> Result<Ia5String> {
    Ia5String::try_from(value.to_string()).map_err(|e| {
        PkiError::CertificateGenerationFailed(format!("invalid {} '{}': {}", what, value, e))
    })
}

/// Distinguished name attributes; empty attributes are omitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    /// CN
    pub common_name: String,
    /// O
    pub organization: String,
    /// OU
    pub organizational_unit: String,
    /// L
    pub locality: String,
    /// ST
    pub state: String,
    /// C
    pub country: String,
}

impl Subject {
    fn distinguished_name(&self) -> DistinguishedName {
        let mut dn = DistinguishedName::new();
        let attributes = [
            (DnType::CountryName, &self.country),
            (DnType::StateOrProvinceName, &self.state),
            (DnType::LocalityName, &self.locality),
            (DnType::OrganizationName, &self.organization),
            (DnType::OrganizationalUnitName, &self.organizational_unit),
            (DnType::CommonName, &self.common_name),
        ];
        for (kind, value) in attributes {
            if !value.is_empty() {
                dn.push(kind, DnValue::Utf8String(value.clone()));
            }
        }
        dn
    }
}

/// What a leaf certificate should say about its holder
#[derive(Debug, Clone, Default)]
pub struct CertificateRequest {
    /// Subject name
    pub subject: Subject,
    /// DNS subject alternative names; empty entries are skipped
    pub dns_names: Vec<String>,
    /// E-mail subject alternative name
    pub email: Option<String>,
}

impl CertificateRequest {
    /// Non-empty DNS names
    pub(crate) fn dns_names(&self) -> impl Iterator<Item = &str> {
        self.dns_names
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// E-mail address, if one is set
    pub(crate) fn email_address(&self) -> Option<&str> {
        self.email.as_deref().filter(|e| !e.is_empty())
    }
}

/// Parsed view of a certificate
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject in RFC 4514 form
    pub subject: String,
    /// Issuer in RFC 4514 form
    pub issuer: String,
    /// Subject common name
    pub common_name: String,
    /// Serial number bytes (big endian, no sign padding)
    pub serial: Vec<u8>,
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
    /// BasicConstraints CA flag
    pub is_ca: bool,
    /// BasicConstraints path length
    pub path_len_constraint: Option<u32>,
    /// Subject Key Identifier extension
    pub subject_key_id: Option<Vec<u8>>,
    /// Key usage: keyCertSign
    pub key_cert_sign: bool,
    /// Key usage: digitalSignature
    pub digital_signature: bool,
    /// Key usage: keyEncipherment
    pub key_encipherment: bool,
    /// Extended key usage: serverAuth
    pub server_auth: bool,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// E-mail subject alternative names
    pub email_addresses: Vec<String>,
    /// SubjectPublicKeyInfo DER
    pub public_key_der: Vec<u8>,
    /// SubjectPublicKeyInfo BIT STRING contents
    pub public_key_raw: Vec<u8>,
}

impl CertificateInfo {
    /// Parse certificate info from a PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data, CERTIFICATE_LABEL)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from a DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or("")
            .to_string();

        let mut info = Self {
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            common_name,
            serial: cert.raw_serial().to_vec(),
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
            is_ca: false,
            path_len_constraint: None,
            subject_key_id: None,
            key_cert_sign: false,
            digital_signature: false,
            key_encipherment: false,
            server_auth: false,
            dns_names: Vec::new(),
            email_addresses: Vec::new(),
            public_key_der: cert.public_key().raw.to_vec(),
            public_key_raw: cert.public_key().subject_public_key.data.to_vec(),
        };

        for ext in cert.extensions() {
            match ext.parsed_extension() {
                ParsedExtension::BasicConstraints(bc) => {
                    info.is_ca = bc.ca;
                    info.path_len_constraint = bc.path_len_constraint;
                }
                ParsedExtension::KeyUsage(ku) => {
                    info.key_cert_sign = ku.key_cert_sign();
                    info.digital_signature = ku.digital_signature();
                    info.key_encipherment = ku.key_encipherment();
                }
                ParsedExtension::ExtendedKeyUsage(eku) => {
                    info.server_auth = eku.server_auth;
                }
                ParsedExtension::SubjectKeyIdentifier(id) => {
                    info.subject_key_id = Some(id.0.to_vec());
                }
                ParsedExtension::SubjectAlternativeName(san) => {
                    for name in &san.general_names {
                        match name {
                            GeneralName::DNSName(dns) => info.dns_names.push(dns.to_string()),
                            GeneralName::RFC822Name(email) => {
                                info.email_addresses.push(email.to_string())
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(info)
    }

    /// Public key as a `PUBLIC KEY` PEM block
    pub fn public_key_pem(&self) -> String {
        encode_pem(PUBLIC_KEY_LABEL, &self.public_key_der)
    }

    /// Serial number as colon-separated hex
    pub fn serial_hex(&self) -> String {
        self.serial
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":")
    }
}

/// Check that `cert_der` names `ca_cert_der`'s subject as issuer and that
/// its signature verifies against the CA public key
pub fn verify_issued_by(cert_der: &[u8], ca_cert_der: &[u8]) -> Result<bool> {
    let (_, cert) = X509Certificate::from_der(cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;
    let (_, ca_cert) = X509Certificate::from_der(ca_cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA certificate: {}", e)))?;

    if cert.issuer().to_string() != ca_cert.subject().to_string() {
        return Ok(false);
    }
    if let Some(verified) = x509::verify_p224_signature(cert_der, ca_cert_der)? {
        return Ok(verified);
    }
    Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
}

/// Write a key/certificate pair with the PKI file permissions
pub fn persist_material(
    key_path: &Path,
    key_pem: &str,
    cert_path: &Path,
    cert_pem: &str,
) -> Result<()> {
    write_with_mode(key_path, key_pem.as_bytes(), PRIVATE_KEY_MODE)?;
    write_with_mode(cert_path, cert_pem.as_bytes(), PUBLIC_FILE_MODE)?;
    debug!(key = %key_path.display(), cert = %cert_path.display(), "key material written");
    Ok(())
}

/// A leaf certificate together with its freshly generated key
#[derive(Debug)]
pub struct IssuedCertificate {
    cert_der: Vec<u8>,
    cert_pem: String,
    key: KeyMaterial,
}

impl IssuedCertificate {
    /// DER encoding of the certificate
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// PEM encoding of the certificate
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// The leaf's own key pair
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Parsed summary of the certificate
    pub fn info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_der(&self.cert_der)
    }

    /// Write the key (0400) and certificate (0644)
    pub fn persist(&self, key_path: &Path, cert_path: &Path) -> Result<()> {
        persist_material(key_path, &self.key.private_key_pem(), cert_path, &self.cert_pem)
    }
}

/// Self-signed root certificate authority
#[derive(Debug)]
pub struct CertificateAuthority {
    cert_pem: String,
    cert_der: Vec<u8>,
    key: KeyMaterial,
    subject_key_id: Vec<u8>,
}

impl CertificateAuthority {
    /// Create the self-signed root for `subject` using `key`
    pub fn issue_root(subject: &Subject, email: &str, key: KeyMaterial) -> Result<Self> {
        let serial = random_serial()?;
        let subject_key_id = key.subject_key_identifier();
        let validity = compute_validity(CA_VALIDITY_YEARS);

        let cert_der = match key.rcgen_key() {
            Some(key_pair) => {
                let mut params = CertificateParams::default();
                params.distinguished_name = subject.distinguished_name();
                params.serial_number = Some(SerialNumber::from_slice(&serial));

                // May sign leaves, never intermediates
                params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
                params.key_usages = vec![KeyUsagePurpose::KeyCertSign];

                if !email.is_empty() {
                    params.subject_alt_names =
                        vec![SanType::Rfc822Name(ia5(email, "e-mail address")?)];
                }
                params.key_identifier_method = KeyIdMethod::PreSpecified(subject_key_id.clone());
                (params.not_before, params.not_after) = validity;

                let cert = params.self_signed(key_pair).map_err(|e| {
                    PkiError::CertificateGenerationFailed(format!("failed to create CA cert: {}", e))
                })?;
                cert.der().to_vec()
            }
            None => x509::root_certificate(
                subject,
                email,
                &serial,
                validity,
                &key,
                &subject_key_id,
            )?,
        };

        info!(ca = %subject.common_name, "root CA certificate created");

        Ok(Self {
            cert_pem: encode_pem(CERTIFICATE_LABEL, &cert_der),
            cert_der,
            key,
            subject_key_id,
        })
    }

    /// Load a CA from its PEM certificate and PKCS#8 PEM key
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let cert_der = parse_pem(cert_pem, CERTIFICATE_LABEL)?;
        let key = KeyMaterial::from_pem(key_pem)?;

        let info = CertificateInfo::from_der(&cert_der)?;
        if !info.is_ca {
            return Err(PkiError::ParseError(format!(
                "certificate {:?} is not a CA",
                info.subject
            )));
        }
        if info.public_key_raw != key.public_key_raw() {
            return Err(PkiError::ParseError(
                "CA private key does not match the certificate".to_string(),
            ));
        }
        let subject_key_id = info
            .subject_key_id
            .unwrap_or_else(|| key.subject_key_identifier());

        Ok(Self {
            cert_pem: cert_pem.to_string(),
            cert_der,
            key,
            subject_key_id,
        })
    }

    /// Load a CA from the files written by [`CertificateAuthority::persist`]
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let cert_pem =
            std::fs::read_to_string(cert_path).map_err(|e| PkiError::io(cert_path, e))?;
        let key_pem = std::fs::read_to_string(key_path).map_err(|e| PkiError::io(key_path, e))?;
        Self::from_pem(&cert_pem, &key_pem)
    }

    /// Get the CA certificate in PEM format
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Get the CA certificate in DER format
    pub fn cert_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// The CA key pair
    pub fn key(&self) -> &KeyMaterial {
        &self.key
    }

    /// Subject Key Identifier of the CA certificate
    pub fn subject_key_id(&self) -> &[u8] {
        &self.subject_key_id
    }

    /// Parsed summary of the CA certificate
    pub fn info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_der(&self.cert_der)
    }

    /// Write the CA key (0400) and certificate (0644)
    pub fn persist(&self, key_path: &Path, cert_path: &Path) -> Result<()> {
        persist_material(key_path, &self.key.private_key_pem(), cert_path, &self.cert_pem)
    }

    /// Issue a TLS server certificate with a fresh key pair of `scheme`
    pub fn issue_leaf(
        &self,
        request: &CertificateRequest,
        scheme: KeyScheme,
    ) -> Result<IssuedCertificate> {
        let serial = random_serial()?;
        let validity = compute_validity(CERT_VALIDITY_YEARS);
        let leaf_key = KeyMaterial::generate(scheme)?;

        let cert_der = match (self.key.rcgen_key(), leaf_key.rcgen_key()) {
            (Some(ca_key_pair), Some(leaf_key_pair)) => {
                let mut params = CertificateParams::default();
                params.distinguished_name = request.subject.distinguished_name();
                params.serial_number = Some(SerialNumber::from_slice(&serial));

                params.is_ca = IsCa::ExplicitNoCa;
                params.key_usages = vec![
                    KeyUsagePurpose::DigitalSignature,
                    KeyUsagePurpose::KeyEncipherment,
                ];
                params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
                params.use_authority_key_identifier_extension = true;

                let mut sans = request
                    .dns_names()
                    .map(|name| ia5(name, "DNS name").map(SanType::DnsName))
                    .collect::<Result<Vec<_>>>()?;
                if let Some(email) = request.email_address() {
                    sans.push(SanType::Rfc822Name(ia5(email, "e-mail address")?));
                }
                params.subject_alt_names = sans;
                (params.not_before, params.not_after) = validity;

                let issuer = Issuer::from_ca_cert_pem(&self.cert_pem, ca_key_pair)
                    .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;
                let cert = params.signed_by(leaf_key_pair, &issuer).map_err(|e| {
                    PkiError::CertificateGenerationFailed(format!(
                        "failed to sign server cert: {}",
                        e
                    ))
                })?;
                cert.der().to_vec()
            }
            _ => x509::leaf_certificate(
                request,
                &serial,
                validity,
                &leaf_key,
                &self.cert_der,
                &self.key,
                &self.subject_key_id,
            )?,
        };

        info!(
            subject = %request.subject.common_name,
            scheme = %scheme,
            "TLS server certificate signed"
        );

        Ok(IssuedCertificate {
            cert_pem: encode_pem(CERTIFICATE_LABEL, &cert_der),
            cert_der,
            key: leaf_key,
        })
    }
}
