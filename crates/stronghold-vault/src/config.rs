//! Worker configuration
//!
//! Read from TOML. Keys keep the legacy `[SecretService]` spelling so
//! existing deployment files load unchanged:
//!
//! ```toml
//! [SecretService]
//! Scheme = "https"
//! Server = "edgex-vault"
//! Port = 8200
//! TokenFolderPath = "/vault/config/assets"
//! VaultInitParm = "resp-init.json"
//! VaultSecretShares = 5
//! VaultSecretThreshold = 3
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Whole configuration file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WorkerConfig {
    /// Free-form title
    #[serde(default)]
    pub title: String,
    /// Secret store connection and bootstrap settings
    pub secret_service: SecretServiceConfig,
}

/// Port accepted as `8200` or `"8200"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PortRepr {
    Number(u16),
    Text(String),
}

fn port<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match PortRepr::deserialize(deserializer)? {
        PortRepr::Number(n) => Ok(n),
        PortRepr::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid port {:?}: {}", s, e))),
    }
}

/// `[SecretService]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretServiceConfig {
    /// `http` or `https`
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Store host name
    pub server: String,
    /// Store port
    #[serde(deserialize_with = "port")]
    pub port: u16,
    /// CA bundle used to verify the store when verification is on
    #[serde(default, rename = "CAFilePath")]
    pub ca_file_path: Option<PathBuf>,

    /// Secret path for the API gateway certificate/key pair
    #[serde(default = "default_cert_path")]
    pub cert_path: String,
    /// Mounted PEM certificate to upload
    #[serde(default)]
    pub cert_file_path: PathBuf,
    /// Mounted PEM private key to upload
    #[serde(default)]
    pub key_file_path: PathBuf,

    /// File name (inside `token_folder_path`) of the persisted init response
    #[serde(default = "default_init_parm")]
    pub vault_init_parm: String,
    /// Number of Shamir shares to generate
    #[serde(default = "default_shares")]
    pub vault_secret_shares: u32,
    /// Shares required to unseal
    #[serde(default = "default_threshold")]
    pub vault_secret_threshold: u32,
    /// Directory for the init response and token files
    pub token_folder_path: PathBuf,

    /// Admin policy document
    #[serde(default, rename = "PolicyPath4Admin")]
    pub policy_path_admin: PathBuf,
    /// Admin policy name
    #[serde(default = "default_admin", rename = "PolicyName4Admin")]
    pub policy_name_admin: String,
    /// Admin token name
    #[serde(default = "default_admin", rename = "TokenName4Admin")]
    pub token_name_admin: String,
    /// Gateway policy document
    #[serde(default, rename = "PolicyPath4Kong")]
    pub policy_path_kong: PathBuf,
    /// Gateway policy name
    #[serde(default = "default_kong", rename = "PolicyName4Kong")]
    pub policy_name_kong: String,
    /// Gateway token name
    #[serde(default = "default_kong", rename = "TokenName4Kong")]
    pub token_name_kong: String,

    /// Mongo credentials
    #[serde(default = "default_mongo_path")]
    pub mongo_secret_path: String,
    /// Core data credentials
    #[serde(default = "default_coredata_path")]
    pub coredata_secret_path: String,
    /// Metadata credentials
    #[serde(default = "default_metadata_path")]
    pub metadata_secret_path: String,
    /// Rules engine credentials
    #[serde(default = "default_rulesengine_path", alias = "RulesenginesecretPath")]
    pub rulesengine_secret_path: String,
    /// Notifications credentials
    #[serde(default = "default_notifications_path")]
    pub notifications_secret_path: String,
    /// Scheduler credentials
    #[serde(default = "default_scheduler_path")]
    pub scheduler_secret_path: String,
    /// Logging credentials
    #[serde(default = "default_logging_path")]
    pub logging_secret_path: String,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_cert_path() -> String {
    "v1/secret/edgex/pki/tls/edgex-kong".to_string()
}

fn default_init_parm() -> String {
    "resp-init.json".to_string()
}

fn default_shares() -> u32 {
    5
}

fn default_threshold() -> u32 {
    3
}

fn default_admin() -> String {
    "admin".to_string()
}

fn default_kong() -> String {
    "kong".to_string()
}

fn secret_path(service: &str) -> String {
    format!("v1/secret/edgex/{}", service)
}

fn default_mongo_path() -> String {
    secret_path("mongo")
}

fn default_coredata_path() -> String {
    secret_path("coredata")
}

fn default_metadata_path() -> String {
    secret_path("metadata")
}

fn default_rulesengine_path() -> String {
    secret_path("rulesengine")
}

fn default_notifications_path() -> String {
    secret_path("notifications")
}

fn default_scheduler_path() -> String {
    secret_path("scheduler")
}

fn default_logging_path() -> String {
    secret_path("logging")
}

/// A policy document and the token bound to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTokenPair {
    /// Policy name in the store
    pub policy_name: String,
    /// Local policy document
    pub policy_path: PathBuf,
    /// Token display name and file stem
    pub token_name: String,
}

impl WorkerConfig {
    /// Parse a configuration document and validate it
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::config(format!("invalid worker configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Reject settings the store would refuse or that make paths ambiguous
    pub fn validate(&self) -> Result<()> {
        let s = &self.secret_service;
        if s.scheme != "http" && s.scheme != "https" {
            return Err(Error::config(format!(
                "unsupported scheme {:?}: expected http or https",
                s.scheme
            )));
        }
        if s.server.trim().is_empty() {
            return Err(Error::config("Server must not be empty"));
        }
        if s.vault_secret_shares == 0 || s.vault_secret_threshold == 0 {
            return Err(Error::config(
                "VaultSecretShares and VaultSecretThreshold must be at least 1",
            ));
        }
        if s.vault_secret_threshold > s.vault_secret_shares {
            return Err(Error::config(format!(
                "VaultSecretThreshold ({}) exceeds VaultSecretShares ({})",
                s.vault_secret_threshold, s.vault_secret_shares
            )));
        }
        if s.vault_init_parm.trim().is_empty() || s.vault_init_parm.contains('/') {
            return Err(Error::config(format!(
                "VaultInitParm {:?} must be a plain file name",
                s.vault_init_parm
            )));
        }
        for pair in self.policy_token_pairs() {
            if pair.policy_name.trim().is_empty() || pair.token_name.trim().is_empty() {
                return Err(Error::config("policy and token names must not be empty"));
            }
            if pair.token_name.contains('/') {
                return Err(Error::config(format!(
                    "token name {:?} must be a plain name",
                    pair.token_name
                )));
            }
        }
        Ok(())
    }

    /// `<scheme>://<server>:<port>/`
    pub fn base_url(&self) -> String {
        let s = &self.secret_service;
        format!("{}://{}:{}/", s.scheme, s.server, s.port)
    }

    /// Where the init response (shares and root token) is persisted
    pub fn init_file_path(&self) -> PathBuf {
        let s = &self.secret_service;
        s.token_folder_path.join(&s.vault_init_parm)
    }

    /// Policy/token pairs to provision, in order
    pub fn policy_token_pairs(&self) -> Vec<PolicyTokenPair> {
        let s = &self.secret_service;
        vec![
            PolicyTokenPair {
                policy_name: s.policy_name_admin.clone(),
                policy_path: s.policy_path_admin.clone(),
                token_name: s.token_name_admin.clone(),
            },
            PolicyTokenPair {
                policy_name: s.policy_name_kong.clone(),
                policy_path: s.policy_path_kong.clone(),
                token_name: s.token_name_kong.clone(),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"
        Title = "Security Service Configuration"

        [SecretService]
        Scheme = "https"
        Server = "edgex-vault"
        Port = "8200"
        CAFilePath = "/vault/config/pki/EdgeXFoundryCA/EdgeXFoundryCA.pem"
        CertPath = "v1/secret/edgex/pki/tls/edgex-kong"
        CertFilePath = "/vault/config/pki/EdgeXFoundryCA/edgex-kong.pem"
        KeyFilePath = "/vault/config/pki/EdgeXFoundryCA/edgex-kong.priv.key"
        VaultInitParm = "resp-init.json"
        VaultSecretShares = 5
        VaultSecretThreshold = 3
        TokenFolderPath = "/vault/config/assets"
        PolicyPath4Admin = "/vault/config/assets/admin-policy.hcl"
        PolicyName4Admin = "admin"
        TokenName4Admin = "admin"
        PolicyPath4Kong = "/vault/config/assets/kong-policy.hcl"
        PolicyName4Kong = "kong"
        TokenName4Kong = "kong"
        MongoSecretPath = "v1/secret/edgex/mongo"
        RulesenginesecretPath = "v1/secret/edgex/rulesengine"
    "#;

    #[test]
    fn legacy_file_loads() {
        let config = WorkerConfig::from_toml(LEGACY).unwrap();
        let s = &config.secret_service;

        assert_eq!(s.port, 8200);
        assert_eq!(config.base_url(), "https://edgex-vault:8200/");
        assert_eq!(
            config.init_file_path(),
            PathBuf::from("/vault/config/assets/resp-init.json")
        );
        assert_eq!(s.rulesengine_secret_path, "v1/secret/edgex/rulesengine");
        assert_eq!(s.scheduler_secret_path, "v1/secret/edgex/scheduler");

        let pairs = config.policy_token_pairs();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].policy_name, "admin");
        assert_eq!(pairs[1].token_name, "kong");
    }

    #[test]
    fn threshold_above_shares_is_rejected() {
        let text = LEGACY.replace("VaultSecretThreshold = 3", "VaultSecretThreshold = 6");
        let err = WorkerConfig::from_toml(&text).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn zero_shares_is_rejected() {
        let text = LEGACY
            .replace("VaultSecretShares = 5", "VaultSecretShares = 0")
            .replace("VaultSecretThreshold = 3", "VaultSecretThreshold = 0");
        assert!(WorkerConfig::from_toml(&text).is_err());
    }

    #[test]
    fn unknown_scheme_is_rejected() {
        let text = LEGACY.replace(r#"Scheme = "https""#, r#"Scheme = "ftp""#);
        assert!(matches!(
            WorkerConfig::from_toml(&text).unwrap_err(),
            Error::Config(_)
        ));
    }

    #[test]
    fn numeric_port_is_accepted() {
        let text = LEGACY.replace(r#"Port = "8200""#, "Port = 8201");
        assert_eq!(WorkerConfig::from_toml(&text).unwrap().secret_service.port, 8201);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            WorkerConfig::from_toml("[SecretService").unwrap_err(),
            Error::Config(_)
        ));
    }
}
