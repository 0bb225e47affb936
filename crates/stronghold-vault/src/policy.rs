//! Policy document import

use std::fmt::Write as _;
use std::path::Path;

use aws_lc_rs::digest::{digest, SHA256};
use tracing::info;

use crate::client::{PolicyRequest, SecretStore};
use crate::{Error, Result};

/// Result of importing one policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The store accepted the policy
    Imported,
    /// The store reported the policy already exists
    AlreadyPresent,
}

/// Policy rules with comments and blank lines removed, joined by single spaces
///
/// A line is a comment when its first non-blank characters are `#` or `//`.
pub fn policy_body(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with("//"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase hex SHA-256 of a policy document
pub fn policy_digest(bytes: &[u8]) -> String {
    digest(&SHA256, bytes)
        .as_ref()
        .iter()
        .fold(String::with_capacity(64), |mut out, b| {
            let _ = write!(out, "{:02x}", b);
            out
        })
}

/// Imports policy documents with the root token
pub struct PolicyImporter<'a, S: SecretStore + ?Sized> {
    store: &'a S,
    token: &'a str,
}

impl<'a, S: SecretStore + ?Sized> PolicyImporter<'a, S> {
    /// Importer authenticating with `token`
    pub fn new(store: &'a S, token: &'a str) -> Self {
        Self { store, token }
    }

    /// Read `path` and import it as policy `name`
    pub async fn import(&self, name: &str, path: &Path) -> Result<ImportOutcome> {
        let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        info!(
            policy = name,
            file = %path.display(),
            sha256 = %policy_digest(&raw),
            "importing policy"
        );
        let text = String::from_utf8(raw).map_err(|e| {
            Error::config(format!(
                "policy file {} is not valid UTF-8: {}",
                path.display(),
                e.utf8_error()
            ))
        })?;
        self.import_text(name, &text).await
    }

    /// Import already-loaded policy text as policy `name`
    pub async fn import_text(&self, name: &str, text: &str) -> Result<ImportOutcome> {
        let request = PolicyRequest {
            policy: policy_body(text),
        };
        let response = self.store.put_policy(self.token, name, &request).await?;
        match response.status {
            204 => {
                info!(policy = name, "policy imported");
                Ok(ImportOutcome::Imported)
            }
            409 => {
                info!(policy = name, "policy already present");
                Ok(ImportOutcome::AlreadyPresent)
            }
            _ => Err(response.reject(format!("import policy {}", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockSecretStore, StoreResponse};

    const ADMIN_POLICY: &str = r#"
# Full access to the edgex tree
path "secret/edgex/*" {
  capabilities = ["create", "read", "update", "delete", "list"]
}

// token management
path "auth/token/*" {
  capabilities = ["create", "update"]
}
"#;

    #[test]
    fn body_drops_comments_and_blank_lines() {
        assert_eq!(
            policy_body(ADMIN_POLICY),
            r#"path "secret/edgex/*" { capabilities = ["create", "read", "update", "delete", "list"] } path "auth/token/*" { capabilities = ["create", "update"] }"#
        );
    }

    #[test]
    fn indented_comments_are_dropped() {
        assert_eq!(policy_body("   # note\n\t// other\npath \"a\" {}"), "path \"a\" {}");
    }

    #[test]
    fn comment_only_policy_is_empty() {
        assert_eq!(policy_body("# nothing\n\n// here\n"), "");
    }

    #[test]
    fn digest_is_hex_sha256() {
        assert_eq!(
            policy_digest(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn comment_only_policy_imports_as_empty_body() {
        let mut store = MockSecretStore::new();
        store
            .expect_put_policy()
            .withf(|token, name, req| token == "s.root" && name == "empty" && req.policy.is_empty())
            .times(1)
            .returning(|_, _, _| Ok(StoreResponse::new(204, "")));

        let outcome = PolicyImporter::new(&store, "s.root")
            .import_text("empty", "# only a comment\n")
            .await
            .unwrap();
        assert_eq!(outcome, ImportOutcome::Imported);
    }

    #[tokio::test]
    async fn conflict_means_already_present() {
        let mut store = MockSecretStore::new();
        store
            .expect_put_policy()
            .returning(|_, _, _| Ok(StoreResponse::new(409, "")));

        let outcome = PolicyImporter::new(&store, "s.root")
            .import_text("admin", ADMIN_POLICY)
            .await
            .unwrap();
        assert_eq!(outcome, ImportOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn other_status_names_the_policy() {
        let mut store = MockSecretStore::new();
        store
            .expect_put_policy()
            .returning(|_, _, _| Ok(StoreResponse::new(403, "permission denied")));

        let err = PolicyImporter::new(&store, "s.root")
            .import_text("kong", "path \"a\" {}")
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(err.to_string().contains("kong"));
    }

    #[tokio::test]
    async fn ok_with_body_is_not_an_import() {
        let mut store = MockSecretStore::new();
        store
            .expect_put_policy()
            .returning(|_, _, _| Ok(StoreResponse::new(200, "{}")));

        let err = PolicyImporter::new(&store, "s.root")
            .import_text("admin", ADMIN_POLICY)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(200));
        assert!(err.to_string().contains("admin"));
    }

    #[tokio::test]
    async fn policy_file_must_be_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("admin-policy.hcl");
        std::fs::write(&path, b"path \"secret/\xff\" {}\n").unwrap();
        let mut store = MockSecretStore::new();
        store.expect_put_policy().never();

        let err = PolicyImporter::new(&store, "s.root")
            .import("admin", &path)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("admin-policy.hcl"));
    }

    #[tokio::test]
    async fn missing_policy_file_is_a_filesystem_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockSecretStore::new();

        let err = PolicyImporter::new(&store, "s.root")
            .import("admin", &dir.path().join("admin-policy.hcl"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileSystem { .. }));
    }
}
