//! PKI setup configuration
//!
//! The JSON file mirrors the legacy layout: booleans and the RSA key size may
//! be written either as JSON strings (`"true"`, `"4096"`) or as native
//! values. [`PkiSetup::from_config`] resolves it into validated paths,
//! subjects and a [`KeyScheme`] without touching the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::authority::{CertificateRequest, Subject};
use crate::scheme::KeyScheme;
use crate::{PkiError, Result};

/// File extension for private keys
pub const PRIVATE_KEY_EXT: &str = ".priv.key";

/// File extension for certificates
pub const CERTIFICATE_EXT: &str = ".pem";

/// Domain that makes the bare host name the primary FQDN
pub const LOCAL_DOMAIN: &str = "local";

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Number(u64),
    Text(String),
}

/// Accept `true`, `"true"`, `"T"`, `"1"`, `1` and their false counterparts
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(b)) => Ok(b),
        Some(Scalar::Number(0)) => Ok(false),
        Some(Scalar::Number(1)) => Ok(true),
        Some(Scalar::Number(n)) => Err(serde::de::Error::custom(format!(
            "invalid boolean: {}",
            n
        ))),
        Some(Scalar::Text(s)) => parse_flag(&s).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid boolean: {:?}", s))
        }),
    }
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim() {
        "" => Some(false),
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Accept `4096` or `"4096"`; validity is checked when the scheme is built
fn number_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Number(n)) => Ok(Some(n.to_string())),
        Some(Scalar::Text(s)) => Ok(Some(s)),
        Some(Scalar::Bool(b)) => Err(serde::de::Error::custom(format!(
            "expected a number, found {}",
            b
        ))),
    }
}

/// Key scheme section (`key_scheme`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySchemeConfig {
    /// Log public key material of generated keys
    #[serde(default, deserialize_with = "flag")]
    pub dump_keys: bool,
    /// Select RSA
    #[serde(default, deserialize_with = "flag")]
    pub rsa: bool,
    /// RSA modulus size in bits
    #[serde(default, deserialize_with = "number_text")]
    pub rsa_key_size: Option<String>,
    /// Select elliptic curves
    #[serde(default, deserialize_with = "flag")]
    pub ec: bool,
    /// Curve identifier (`224`, `256`, `384`, `521`)
    #[serde(default)]
    pub ec_curve: Option<String>,
}

/// Root CA section (`x509_root_ca_parameters`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RootCaConfig {
    /// CA name, also the CA directory and file stem
    pub ca_name: String,
    /// Country
    #[serde(default)]
    pub ca_c: String,
    /// State or province
    #[serde(default)]
    pub ca_st: String,
    /// Locality
    #[serde(default)]
    pub ca_l: String,
    /// Organization (used as OU; O carries the CA name)
    #[serde(default)]
    pub ca_o: String,
}

/// TLS server section (`x509_tls_server_parameters`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsServerConfig {
    /// Host name, also the leaf file stem
    pub tls_host: String,
    /// Domain appended to the host unless it is `local`
    #[serde(default)]
    pub tls_domain: String,
    /// Country
    #[serde(default)]
    pub tls_c: String,
    /// State or province
    #[serde(default)]
    pub tls_st: String,
    /// Locality
    #[serde(default)]
    pub tls_l: String,
    /// Organization (used as OU; O carries the host name)
    #[serde(default)]
    pub tls_o: String,
}

/// Whole PKI setup file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct X509Config {
    /// Wipe the CA directory and create a new root
    #[serde(default, deserialize_with = "flag")]
    pub create_new_rootca: bool,
    /// Base directory, relative paths resolve against the process cwd
    pub working_dir: PathBuf,
    /// Directory under `working_dir` holding one directory per CA
    pub pki_setup_dir: String,
    /// Log every parameter before running
    #[serde(default, deserialize_with = "flag")]
    pub dump_config: bool,
    /// Key scheme selection
    pub key_scheme: KeySchemeConfig,
    /// Root CA subject
    #[serde(rename = "x509_root_ca_parameters")]
    pub root_ca: RootCaConfig,
    /// TLS server subject
    #[serde(rename = "x509_tls_server_parameters")]
    pub tls_server: TlsServerConfig,
}

impl X509Config {
    /// Parse a configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PkiError::config(format!("invalid PKI configuration: {}", e)))
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| PkiError::io(path, e))?;
        Self::from_json(&json)
    }

    /// Log every configuration parameter
    pub fn dump(&self) {
        info!(
            create_new_rootca = self.create_new_rootca,
            working_dir = %self.working_dir.display(),
            pki_setup_dir = %self.pki_setup_dir,
            dump_config = self.dump_config,
            "configuration parameters"
        );
        let ks = &self.key_scheme;
        info!(
            dump_keys = ks.dump_keys,
            rsa = ks.rsa,
            rsa_key_size = ks.rsa_key_size.as_deref().unwrap_or(""),
            ec = ks.ec,
            ec_curve = ks.ec_curve.as_deref().unwrap_or(""),
            "key scheme parameters"
        );
        let ca = &self.root_ca;
        info!(
            ca_name = %ca.ca_name,
            ca_c = %ca.ca_c,
            ca_st = %ca.ca_st,
            ca_l = %ca.ca_l,
            ca_o = %ca.ca_o,
            "root CA parameters"
        );
        let tls = &self.tls_server;
        info!(
            tls_host = %tls.tls_host,
            tls_domain = %tls.tls_domain,
            tls_c = %tls.tls_c,
            tls_st = %tls.tls_st,
            tls_l = %tls.tls_l,
            tls_o = %tls.tls_o,
            "TLS server parameters"
        );
    }
}

/// Primary and alternate FQDN of the TLS server
///
/// With the `local` domain the bare host is primary and `host.local` the
/// alternate; otherwise `host.domain` is the only name.
pub fn server_names(host: &str, domain: &str) -> (String, Option<String>) {
    if domain == LOCAL_DOMAIN {
        (host.to_string(), Some(format!("{}.{}", host, domain)))
    } else if domain.is_empty() {
        (host.to_string(), None)
    } else {
        (format!("{}.{}", host, domain), None)
    }
}

/// Resolved PKI run: where files go and what they contain
#[derive(Debug, Clone)]
pub struct PkiSetup {
    /// `<abs working_dir>/<pki_setup_dir>/<ca_name>`
    pub ca_dir: PathBuf,
    /// Create a new root CA (destructive)
    pub new_ca: bool,
    /// Log public key material
    pub dump_keys: bool,
    /// Scheme for both key pairs
    pub scheme: KeyScheme,

    /// Root CA subject
    pub ca_subject: Subject,
    /// Root CA e-mail SAN
    pub ca_email: String,
    /// Root CA private key file
    pub ca_key_file: PathBuf,
    /// Root CA certificate file
    pub ca_cert_file: PathBuf,

    /// Primary server FQDN
    pub tls_fqdn: String,
    /// Alternate server FQDN
    pub tls_alt_fqdn: Option<String>,
    /// Leaf subject
    pub tls_subject: Subject,
    /// Leaf e-mail SAN
    pub tls_email: String,
    /// Leaf private key file
    pub tls_key_file: PathBuf,
    /// Leaf certificate file
    pub tls_cert_file: PathBuf,
}

impl PkiSetup {
    /// Validate the configuration and resolve every path and subject
    pub fn from_config(config: &X509Config) -> Result<Self> {
        let ks = &config.key_scheme;
        let scheme = KeyScheme::from_selection(
            ks.rsa,
            ks.rsa_key_size.as_deref(),
            ks.ec,
            ks.ec_curve.as_deref(),
        )?;

        let ca = &config.root_ca;
        let tls = &config.tls_server;
        require_file_stem("ca_name", &ca.ca_name)?;
        require_file_stem("tls_host", &tls.tls_host)?;
        if config.pki_setup_dir.trim().is_empty() {
            return Err(PkiError::config("pki_setup_dir must not be empty"));
        }

        let working_dir = std::path::absolute(&config.working_dir)
            .map_err(|e| PkiError::io(&config.working_dir, e))?;
        let ca_dir = working_dir.join(&config.pki_setup_dir).join(&ca.ca_name);

        let (tls_fqdn, tls_alt_fqdn) = server_names(&tls.tls_host, &tls.tls_domain);

        Ok(Self {
            ca_key_file: ca_dir.join(format!("{}{}", ca.ca_name, PRIVATE_KEY_EXT)),
            ca_cert_file: ca_dir.join(format!("{}{}", ca.ca_name, CERTIFICATE_EXT)),
            tls_key_file: ca_dir.join(format!("{}{}", tls.tls_host, PRIVATE_KEY_EXT)),
            tls_cert_file: ca_dir.join(format!("{}{}", tls.tls_host, CERTIFICATE_EXT)),
            ca_dir,
            new_ca: config.create_new_rootca,
            dump_keys: ks.dump_keys,
            scheme,
            ca_subject: Subject {
                common_name: ca.ca_name.clone(),
                organization: ca.ca_name.clone(),
                organizational_unit: ca.ca_o.clone(),
                locality: ca.ca_l.clone(),
                state: ca.ca_st.clone(),
                country: ca.ca_c.clone(),
            },
            ca_email: format!("{}@{}", ca.ca_name, tls.tls_domain),
            tls_subject: Subject {
                common_name: tls_fqdn.clone(),
                organization: tls.tls_host.clone(),
                organizational_unit: tls.tls_o.clone(),
                locality: tls.tls_l.clone(),
                state: tls.tls_st.clone(),
                country: tls.tls_c.clone(),
            },
            tls_email: format!("admin@{}", tls.tls_domain),
            tls_fqdn,
            tls_alt_fqdn,
        })
    }

    /// Leaf certificate request for the TLS server
    pub fn server_request(&self) -> CertificateRequest {
        let mut dns_names = vec![self.tls_fqdn.clone()];
        dns_names.extend(self.tls_alt_fqdn.clone());
        CertificateRequest {
            subject: self.tls_subject.clone(),
            dns_names,
            email: Some(self.tls_email.clone()),
        }
    }
}

impl fmt::Display for PkiSetup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CA {} in {} ({}), server {}",
            self.ca_subject.common_name,
            self.ca_dir.display(),
            self.scheme,
            self.tls_fqdn
        )
    }
}

fn require_file_stem(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(PkiError::config(format!("{} must not be empty", field)));
    }
    if value.contains('/') || value.contains('\\') || value == "." || value == ".." {
        return Err(PkiError::config(format!(
            "{} {:?} must be a plain name, not a path",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::EcCurve;

    const LEGACY_CONFIG: &str = r#"{
        "create_new_rootca": "true",
        "working_dir": "/var/lib/stronghold",
        "pki_setup_dir": "pki",
        "dump_config": "true",
        "key_scheme": {
            "dump_keys": "false",
            "rsa": "false",
            "rsa_key_size": "4096",
            "ec": "true",
            "ec_curve": "384"
        },
        "x509_root_ca_parameters": {
            "ca_name": "EdgeXFoundryCA",
            "ca_c": "US",
            "ca_st": "CA",
            "ca_l": "San Francisco",
            "ca_o": "EdgeXFoundry"
        },
        "x509_tls_server_parameters": {
            "tls_host": "edgex-vault",
            "tls_domain": "local",
            "tls_c": "US",
            "tls_st": "CA",
            "tls_l": "San Francisco",
            "tls_o": "EdgeXFoundry"
        }
    }"#;

    #[test]
    fn legacy_string_flags_are_understood() {
        let config = X509Config::from_json(LEGACY_CONFIG).unwrap();

        assert!(config.create_new_rootca);
        assert!(config.dump_config);
        assert!(!config.key_scheme.dump_keys);
        assert!(!config.key_scheme.rsa);
        assert!(config.key_scheme.ec);
        assert_eq!(config.key_scheme.rsa_key_size.as_deref(), Some("4096"));
        assert_eq!(config.root_ca.ca_name, "EdgeXFoundryCA");
        assert_eq!(config.tls_server.tls_host, "edgex-vault");
    }

    #[test]
    fn native_json_values_are_understood() {
        let json = LEGACY_CONFIG
            .replace(r#""create_new_rootca": "true""#, r#""create_new_rootca": false"#)
            .replace(r#""rsa": "false""#, r#""rsa": true"#)
            .replace(r#""rsa_key_size": "4096""#, r#""rsa_key_size": 2048"#)
            .replace(r#""ec": "true""#, r#""ec": 0"#);
        let config = X509Config::from_json(&json).unwrap();

        assert!(!config.create_new_rootca);
        assert!(config.key_scheme.rsa);
        assert!(!config.key_scheme.ec);
        assert_eq!(config.key_scheme.rsa_key_size.as_deref(), Some("2048"));
    }

    #[test]
    fn unparseable_flag_is_a_config_error() {
        let json = LEGACY_CONFIG.replace(r#""ec": "true""#, r#""ec": "maybe""#);
        let err = X509Config::from_json(&json).unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn local_domain_layout() {
        let config = X509Config::from_json(LEGACY_CONFIG).unwrap();
        let setup = PkiSetup::from_config(&config).unwrap();

        let ca_dir = PathBuf::from("/var/lib/stronghold/pki/EdgeXFoundryCA");
        assert_eq!(setup.ca_dir, ca_dir);
        assert_eq!(setup.ca_key_file, ca_dir.join("EdgeXFoundryCA.priv.key"));
        assert_eq!(setup.ca_cert_file, ca_dir.join("EdgeXFoundryCA.pem"));
        assert_eq!(setup.tls_key_file, ca_dir.join("edgex-vault.priv.key"));
        assert_eq!(setup.tls_cert_file, ca_dir.join("edgex-vault.pem"));

        assert_eq!(setup.tls_fqdn, "edgex-vault");
        assert_eq!(setup.tls_alt_fqdn.as_deref(), Some("edgex-vault.local"));
        assert_eq!(setup.ca_email, "EdgeXFoundryCA@local");
        assert_eq!(setup.tls_email, "admin@local");
        assert_eq!(
            setup.scheme,
            KeyScheme::EllipticCurve {
                curve: EcCurve::P384
            }
        );

        assert_eq!(setup.ca_subject.organization, "EdgeXFoundryCA");
        assert_eq!(setup.ca_subject.organizational_unit, "EdgeXFoundry");
        assert_eq!(setup.tls_subject.common_name, "edgex-vault");
        assert_eq!(setup.tls_subject.organization, "edgex-vault");

        assert_eq!(
            setup.server_request().dns_names,
            vec!["edgex-vault", "edgex-vault.local"]
        );
    }

    #[test]
    fn other_domains_are_appended_without_alternate() {
        assert_eq!(
            server_names("vault", "example.com"),
            ("vault.example.com".to_string(), None)
        );
        assert_eq!(
            server_names("vault", "local"),
            ("vault".to_string(), Some("vault.local".to_string()))
        );
    }

    #[test]
    fn relative_working_dir_becomes_absolute() {
        let json = LEGACY_CONFIG.replace("/var/lib/stronghold", "./run");
        let config = X509Config::from_json(&json).unwrap();
        let setup = PkiSetup::from_config(&config).unwrap();

        assert!(setup.ca_dir.is_absolute());
        assert!(setup.ca_dir.ends_with("run/pki/EdgeXFoundryCA"));
    }

    #[test]
    fn contradictory_scheme_fails_before_io() {
        let json = LEGACY_CONFIG.replace(r#""rsa": "false""#, r#""rsa": "true""#);
        let config = X509Config::from_json(&json).unwrap();

        let err = PkiSetup::from_config(&config).unwrap_err();
        assert!(matches!(err, PkiError::Config(_)));
    }

    #[test]
    fn names_must_not_escape_the_pki_directory() {
        let json = LEGACY_CONFIG.replace(r#""ca_name": "EdgeXFoundryCA""#, r#""ca_name": "../etc""#);
        let config = X509Config::from_json(&json).unwrap();
        assert!(PkiSetup::from_config(&config).is_err());

        let json = LEGACY_CONFIG.replace(r#""tls_host": "edgex-vault""#, r#""tls_host": """#);
        let config = X509Config::from_json(&json).unwrap();
        assert!(PkiSetup::from_config(&config).is_err());
    }
}
