//! Scoped token creation

use std::path::{Path, PathBuf};

use stronghold_common::{write_with_mode, SECRET_FILE_MODE};
use tracing::info;

use crate::client::{SecretStore, TokenMetadata, TokenRequest};
use crate::Result;

/// Lifetime of every issued token
pub const TOKEN_TTL: &str = "168h";

/// Policy every token carries in addition to its own
pub const DEFAULT_POLICY: &str = "default";

/// Result of creating one token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// Token created and its response written to this file
    Created(PathBuf),
    /// The store reported a conflict; nothing was written
    AlreadyExists,
}

/// Token creation request for `name` bound to `policy`
pub fn token_request(name: &str, policy: &str) -> TokenRequest {
    TokenRequest {
        policies: vec![policy.to_string(), DEFAULT_POLICY.to_string()],
        metadata: TokenMetadata {
            user: format!("{} user", name),
        },
        display_name: name.to_string(),
        ttl: TOKEN_TTL.to_string(),
        renewable: true,
    }
}

/// Creates policy-bound tokens and persists their responses
pub struct TokenIssuer<'a, S: SecretStore + ?Sized> {
    store: &'a S,
    token: &'a str,
    folder: &'a Path,
}

impl<'a, S: SecretStore + ?Sized> TokenIssuer<'a, S> {
    /// Issuer authenticating with `token`, writing into `folder`
    pub fn new(store: &'a S, token: &'a str, folder: &'a Path) -> Self {
        Self {
            store,
            token,
            folder,
        }
    }

    /// File a token response for `name` is written to
    pub fn token_file(&self, name: &str) -> PathBuf {
        self.folder.join(format!("{}-token.json", name))
    }

    /// Create token `name` bound to `policy`
    pub async fn create(&self, name: &str, policy: &str) -> Result<TokenOutcome> {
        let request = token_request(name, policy);
        info!(token = name, policy, ttl = TOKEN_TTL, "creating token");

        let response = self.store.create_token(self.token, &request).await?;
        match response.status {
            200 => {
                let path = self.token_file(name);
                write_with_mode(&path, &response.body, SECRET_FILE_MODE)?;
                info!(token = name, file = %path.display(), "token created");
                Ok(TokenOutcome::Created(path))
            }
            409 => {
                info!(token = name, "token already exists");
                Ok(TokenOutcome::AlreadyExists)
            }
            _ => Err(response.reject(format!("create token {}", name))),
        }
    }
}
