//! Secret-store HTTP client
//!
//! The [`SecretStore`] trait is the seam between bootstrap logic and the
//! network. Implementations return the raw status and body of each call and
//! never retry; every component decides for itself which statuses mean
//! success, "already done" or failure.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::WorkerConfig;
use crate::{Error, Result};

/// Health endpoint
pub const HEALTH_API: &str = "v1/sys/health";
/// Initialization endpoint
pub const INIT_API: &str = "v1/sys/init";
/// Unseal endpoint
pub const UNSEAL_API: &str = "v1/sys/unseal";
/// Policy endpoint prefix, followed by the policy name
pub const POLICY_API: &str = "v1/sys/policy/";
/// Token creation endpoint
pub const TOKEN_CREATE_API: &str = "v1/auth/token/create";

/// Authentication header
pub const TOKEN_HEADER: &str = "X-Vault-Token";

/// Content type of every request; bodies set it through `.json()`
const JSON: &str = "application/json";

/// Whole-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Connection and TLS handshake timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Status and body of a store response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw response body
    pub body: Vec<u8>,
}

impl StoreResponse {
    /// Build a response
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self, context: &str) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::decode(context, e))
    }

    /// Turn this response into a rejection of `operation`
    pub fn reject(&self, operation: impl Into<String>) -> Error {
        Error::rejected(operation, self.status, &self.body)
    }
}

/// `POST /v1/sys/init` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitRequest {
    /// Shares to generate
    pub secret_shares: u32,
    /// Shares required to unseal
    pub secret_threshold: u32,
}

/// `POST /v1/sys/unseal` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsealRequest {
    /// One base64 key share
    pub key: String,
    /// Discard previously submitted shares
    pub reset: bool,
}

/// `POST /v1/sys/unseal` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnsealResponse {
    /// Still sealed after this share
    pub sealed: bool,
    /// Threshold
    #[serde(default)]
    pub t: u32,
    /// Total shares
    #[serde(default)]
    pub n: u32,
    /// Shares accepted so far
    #[serde(default)]
    pub progress: u32,
}

/// `POST /v1/sys/policy/<name>` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    /// Policy rules, comments stripped, on one line
    pub policy: String,
}

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Free-form owner label
    pub user: String,
}

/// `POST /v1/auth/token/create` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequest {
    /// Policies attached to the token
    pub policies: Vec<String>,
    /// Metadata
    pub metadata: TokenMetadata,
    /// Display name
    pub display_name: String,
    /// Time to live, e.g. `168h`
    pub ttl: String,
    /// Whether the token may be renewed
    pub renewable: bool,
}

/// Operations the bootstrap needs from the secret store
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// `GET /v1/sys/health`
    async fn health(&self) -> Result<StoreResponse>;

    /// `POST /v1/sys/init`
    async fn init(&self, request: &InitRequest) -> Result<StoreResponse>;

    /// `POST /v1/sys/unseal`
    async fn unseal(&self, request: &UnsealRequest) -> Result<StoreResponse>;

    /// `POST /v1/sys/policy/<name>`
    async fn put_policy(
        &self,
        token: &str,
        name: &str,
        request: &PolicyRequest,
    ) -> Result<StoreResponse>;

    /// `POST /v1/auth/token/create`
    async fn create_token(&self, token: &str, request: &TokenRequest) -> Result<StoreResponse>;

    /// `GET /<path>`
    async fn read_secret(&self, token: &str, path: &str) -> Result<StoreResponse>;

    /// `POST /<path>`
    async fn write_secret(
        &self,
        token: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<StoreResponse>;
}

/// TLS and addressing settings for [`HttpSecretStore`]
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// `<scheme>://<server>:<port>/`
    pub base_url: String,
    /// Accept any server certificate
    pub insecure_skip_verify: bool,
    /// Extra trust anchor (PEM) when verification is on
    pub ca_file: Option<PathBuf>,
}

impl HttpStoreConfig {
    /// Settings derived from the worker configuration
    pub fn from_worker(config: &WorkerConfig, insecure_skip_verify: bool) -> Self {
        Self {
            base_url: config.base_url(),
            insecure_skip_verify,
            ca_file: config.secret_service.ca_file_path.clone(),
        }
    }
}

/// reqwest-backed store client
#[derive(Debug, Clone)]
pub struct HttpSecretStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSecretStore {
    /// Build the client; reads the CA bundle when verification is on
    pub fn new(config: &HttpStoreConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .use_rustls_tls();

        if config.insecure_skip_verify {
            info!("server certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca_file) = &config.ca_file {
            let pem = std::fs::read(ca_file).map_err(|e| Error::io(ca_file, e))?;
            let ca = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                Error::config(format!("invalid CA certificate {}: {}", ca_file.display(), e))
            })?;
            builder = builder.add_root_certificate(ca);
            info!(ca = %ca_file.display(), "loaded root CA certificate");
        }

        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<StoreResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| Error::transport(operation, e))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(operation, e))?;
        debug!(operation, status, "store response");
        Ok(StoreResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl SecretStore for HttpSecretStore {
    async fn health(&self) -> Result<StoreResponse> {
        self.send(
            "health check",
            self.client.get(self.url(HEALTH_API)).header(CONTENT_TYPE, JSON),
        )
        .await
    }

    async fn init(&self, request: &InitRequest) -> Result<StoreResponse> {
        self.send("init", self.client.post(self.url(INIT_API)).json(request))
            .await
    }

    async fn unseal(&self, request: &UnsealRequest) -> Result<StoreResponse> {
        self.send("unseal", self.client.post(self.url(UNSEAL_API)).json(request))
            .await
    }

    async fn put_policy(
        &self,
        token: &str,
        name: &str,
        request: &PolicyRequest,
    ) -> Result<StoreResponse> {
        let url = self.url(&format!("{}{}", POLICY_API, name));
        self.send(
            "import policy",
            self.client.post(url).header(TOKEN_HEADER, token).json(request),
        )
        .await
    }

    async fn create_token(&self, token: &str, request: &TokenRequest) -> Result<StoreResponse> {
        self.send(
            "create token",
            self.client
                .post(self.url(TOKEN_CREATE_API))
                .header(TOKEN_HEADER, token)
                .json(request),
        )
        .await
    }

    async fn read_secret(&self, token: &str, path: &str) -> Result<StoreResponse> {
        self.send(
            "read secret",
            self.client
                .get(self.url(path))
                .header(TOKEN_HEADER, token)
                .header(CONTENT_TYPE, JSON),
        )
        .await
    }

    async fn write_secret(
        &self,
        token: &str,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<StoreResponse> {
        self.send(
            "write secret",
            self.client
                .post(self.url(path))
                .header(TOKEN_HEADER, token)
                .json(body),
        )
        .await
    }
}
