//! Per-service credential seeding
//!
//! Each downstream service gets one username/password pair, written only
//! when its secret path holds nothing yet. Existing credentials are never
//! overwritten, so repeated runs leave a populated store unchanged.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::client::SecretStore;
use crate::config::WorkerConfig;
use crate::{Error, Result};

/// Letters in every generated password
pub const PASSWORD_LETTERS: usize = 4;
/// Digits in every generated password
pub const PASSWORD_DIGITS: usize = 4;

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";

/// Service name and the database user it is provisioned with
pub const CREDENTIAL_REGISTRY: [(&str, &str); 7] = [
    ("mongo", "admin"),
    ("coredata", "core"),
    ("metadata", "meta"),
    ("rulesengine", "rules_engine_user"),
    ("notifications", "notifications"),
    ("scheduler", "scheduler"),
    ("logging", "logging"),
];

/// Credential as stored at a service's secret path
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPasswd {
    /// Username
    #[serde(rename = "User")]
    pub user: String,
    /// Password
    #[serde(rename = "Passwd")]
    pub passwd: String,
}

impl std::fmt::Debug for UserPasswd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserPasswd")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// One credential to seed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceCredential {
    /// Service name
    pub service: &'static str,
    /// Username
    pub user: &'static str,
    /// Secret path relative to the store root
    pub path: String,
}

/// Registry entries paired with their configured secret paths, in registry order
pub fn service_credentials(config: &WorkerConfig) -> Vec<ServiceCredential> {
    let s = &config.secret_service;
    let paths = [
        &s.mongo_secret_path,
        &s.coredata_secret_path,
        &s.metadata_secret_path,
        &s.rulesengine_secret_path,
        &s.notifications_secret_path,
        &s.scheduler_secret_path,
        &s.logging_secret_path,
    ];
    CREDENTIAL_REGISTRY
        .iter()
        .zip(paths)
        .map(|(&(service, user), path)| ServiceCredential {
            service,
            user,
            path: path.clone(),
        })
        .collect()
}

/// Eight characters: four distinct letters and four distinct digits, shuffled
pub fn generate_password() -> String {
    let mut rng = OsRng;
    let mut chars: Vec<u8> = LETTERS
        .choose_multiple(&mut rng, PASSWORD_LETTERS)
        .chain(DIGITS.choose_multiple(&mut rng, PASSWORD_DIGITS))
        .copied()
        .collect();
    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

/// Whether `path` already holds a secret
///
/// 404 is absent. A 2xx response is present when `predicate` accepts its
/// `data` object. Any other status is a rejection.
pub(crate) async fn secret_present<S, F>(
    store: &S,
    token: &str,
    path: &str,
    predicate: F,
) -> Result<bool>
where
    S: SecretStore + ?Sized,
    F: FnOnce(&serde_json::Map<String, Value>) -> bool,
{
    let response = store.read_secret(token, path).await?;
    if response.status == 404 {
        return Ok(false);
    }
    if !response.is_success() {
        return Err(response.reject(format!("read secret {}", path)));
    }
    if response.body.is_empty() {
        return Ok(false);
    }
    let body: Value = response.json(&format!("secret at {}", path))?;
    Ok(match body.get("data") {
        Some(Value::Object(data)) => predicate(data),
        _ => false,
    })
}

/// Seeds one credential per service when absent
pub struct CredentialSeeder<'a, S: SecretStore + ?Sized> {
    store: &'a S,
    token: &'a str,
}

impl<'a, S: SecretStore + ?Sized> CredentialSeeder<'a, S> {
    /// Seeder authenticating with `token`
    pub fn new(store: &'a S, token: &'a str) -> Self {
        Self { store, token }
    }

    /// Seed every credential, returning the services that were written
    pub async fn seed(&self, credentials: &[ServiceCredential]) -> Result<Vec<&'static str>> {
        let mut written = Vec::new();
        for credential in credentials {
            if self.seed_one(credential).await? {
                written.push(credential.service);
            }
        }
        info!(
            written = written.len(),
            total = credentials.len(),
            "credential seeding complete"
        );
        Ok(written)
    }

    /// Seed one credential; `Ok(false)` when it already existed
    pub async fn seed_one(&self, credential: &ServiceCredential) -> Result<bool> {
        let present = secret_present(self.store, self.token, &credential.path, |data| {
            !data.is_empty()
        })
        .await?;
        if present {
            info!(service = credential.service, path = %credential.path, "credential already present");
            return Ok(false);
        }

        let body = serde_json::to_value(UserPasswd {
            user: credential.user.to_string(),
            passwd: generate_password(),
        })
        .map_err(|e| Error::decode("credential body", e))?;

        let response = self
            .store
            .write_secret(self.token, &credential.path, &body)
            .await?;
        match response.status {
            200 | 201 | 409 => {
                info!(
                    service = credential.service,
                    user = credential.user,
                    path = %credential.path,
                    "credential written"
                );
                Ok(true)
            }
            _ => Err(response.reject(format!("write credential for {}", credential.service))),
        }
    }
}
