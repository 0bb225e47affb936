//! Store initialization and the persisted init response
//!
//! The init response holds every key share and the root token. It is written
//! verbatim, owner read/write only, and is afterwards the only source of
//! share material for this process: a store initialized elsewhere cannot be
//! unsealed from here.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use stronghold_common::{write_with_mode, SECRET_FILE_MODE};
use tracing::{debug, info};

use crate::client::{InitRequest, SecretStore};
use crate::{Error, Result};

/// Persisted `POST /v1/sys/init` response
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct InitResponse {
    /// Hex key shares
    #[serde(default)]
    pub keys: Vec<String>,
    /// Base64 key shares, submitted when unsealing
    pub keys_base64: Vec<String>,
    /// Root token
    pub root_token: String,
}

impl std::fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitResponse")
            .field("shares", &self.keys_base64.len())
            .finish_non_exhaustive()
    }
}

impl InitResponse {
    /// Parse a response body or file
    pub fn from_slice(bytes: &[u8], context: &str) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::decode(context, e))
    }

    /// Read the persisted response; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let context = format!("init response file {}", path.display());
        Self::from_slice(&bytes, &context).map(Some)
    }
}

/// Root token from the persisted init response
///
/// Missing file: the store was initialized without us and provisioning
/// cannot authenticate.
pub fn load_root_token(path: &Path) -> Result<String> {
    let response = InitResponse::load(path)?.ok_or_else(|| {
        Error::irrecoverable(format!(
            "root token unavailable: init response file {} does not exist",
            path.display()
        ))
    })?;
    if response.root_token.is_empty() {
        return Err(Error::irrecoverable(format!(
            "init response file {} holds an empty root token",
            path.display()
        )));
    }
    Ok(response.root_token)
}

/// Submits the init request and persists the response
#[derive(Debug, Clone)]
pub struct Initializer {
    init_file: PathBuf,
    shares: u32,
    threshold: u32,
    debug: bool,
}

impl Initializer {
    /// Initializer writing to `init_file`
    pub fn new(init_file: PathBuf, shares: u32, threshold: u32) -> Self {
        Self {
            init_file,
            shares,
            threshold,
            debug: false,
        }
    }

    /// Log the full init response (key shares included)
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Path of the persisted init response
    pub fn init_file(&self) -> &Path {
        &self.init_file
    }

    /// Initialize the store
    ///
    /// Only called after a health probe reported "not initialized".
    pub async fn initialize<S: SecretStore + ?Sized>(&self, store: &S) -> Result<InitResponse> {
        let request = InitRequest {
            secret_shares: self.shares,
            secret_threshold: self.threshold,
        };
        info!(
            shares = self.shares,
            threshold = self.threshold,
            "initializing secret store"
        );

        let response = store.init(&request).await?;
        if response.status != 200 {
            return Err(response.reject("init"));
        }

        // Validate before writing so a garbled body never replaces good state
        let parsed = InitResponse::from_slice(&response.body, "init response")?;
        if self.debug {
            debug!(
                response = %String::from_utf8_lossy(&response.body),
                "init response"
            );
        }

        write_with_mode(&self.init_file, &response.body, SECRET_FILE_MODE)?;
        info!(
            file = %self.init_file.display(),
            shares = parsed.keys_base64.len(),
            "secret store initialized, init response persisted"
        );
        Ok(parsed)
    }
}
