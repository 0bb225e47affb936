//! Applying persisted key shares to a sealed store

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::client::{SecretStore, UnsealRequest, UnsealResponse};
use crate::init::InitResponse;
use crate::{Error, Result};

/// Submits key shares one at a time until the store reports unsealed
#[derive(Debug, Clone)]
pub struct Unsealer {
    init_file: PathBuf,
    debug: bool,
}

impl Unsealer {
    /// Unsealer reading shares from `init_file`
    pub fn new(init_file: PathBuf) -> Self {
        Self {
            init_file,
            debug: false,
        }
    }

    /// Log each share as it is submitted
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Path shares are read from
    pub fn init_file(&self) -> &Path {
        &self.init_file
    }

    /// Unseal the store, returning how many shares were submitted
    ///
    /// Stops at the first response with `sealed=false`. A missing share file
    /// or running out of shares while still sealed is irrecoverable.
    pub async fn unseal<S: SecretStore + ?Sized>(&self, store: &S) -> Result<usize> {
        let shares = InitResponse::load(&self.init_file)?
            .ok_or_else(|| {
                Error::irrecoverable(format!(
                    "store is sealed but no local share file exists at {}; \
                     it was initialized by another instance",
                    self.init_file.display()
                ))
            })?
            .keys_base64;

        if shares.is_empty() {
            return Err(Error::irrecoverable(format!(
                "share file {} contains no key shares",
                self.init_file.display()
            )));
        }

        info!(available = shares.len(), "unsealing secret store");

        for (index, key) in shares.iter().enumerate() {
            if self.debug {
                debug!(share = index + 1, key = %key, "applying key share");
            }
            let request = UnsealRequest {
                key: key.clone(),
                reset: false,
            };
            let response = store.unseal(&request).await?;
            if response.status != 200 {
                return Err(response.reject("unseal"));
            }

            let status: UnsealResponse = response.json("unseal response")?;
            info!(
                share = index + 1,
                of = shares.len(),
                progress = status.progress,
                threshold = status.t,
                "key share applied"
            );

            if !status.sealed {
                info!(applied = index + 1, "threshold reached, store unsealed");
                return Ok(index + 1);
            }
        }

        Err(Error::irrecoverable(format!(
            "all {} key shares applied but the store is still sealed; \
             shares and threshold are misconfigured",
            shares.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MockSecretStore, StoreResponse};
    use mockall::Sequence;

    fn write_shares(dir: &Path, shares: &[&str]) -> PathBuf {
        let path = dir.join("resp-init.json");
        let body = serde_json::json!({
            "keys": shares,
            "keys_base64": shares,
            "root_token": "s.root",
        });
        std::fs::write(&path, body.to_string()).unwrap();
        path
    }

    fn sealed(progress: u32) -> StoreResponse {
        StoreResponse::new(
            200,
            format!(r#"{{"sealed":true,"t":3,"n":5,"progress":{}}}"#, progress),
        )
    }

    fn unsealed() -> StoreResponse {
        StoreResponse::new(200, r#"{"sealed":false,"t":3,"n":5,"progress":0}"#)
    }

    #[tokio::test]
    async fn stops_at_first_unsealed_response() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_shares(dir.path(), &["k1", "k2", "k3", "k4", "k5"]);

        let mut seq = Sequence::new();
        let mut store = MockSecretStore::new();
        for (key, response) in [("k1", sealed(1)), ("k2", sealed(2)), ("k3", unsealed())] {
            store
                .expect_unseal()
                .withf(move |req| req.key == key && !req.reset)
                .times(1)
                .in_sequence(&mut seq)
                .return_once(move |_| Ok(response));
        }

        let applied = Unsealer::new(path).unseal(&store).await.unwrap();
        assert_eq!(applied, 3);
    }

    #[tokio::test]
    async fn exhausted_shares_are_irrecoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_shares(dir.path(), &["k1", "k2"]);

        let mut store = MockSecretStore::new();
        store
            .expect_unseal()
            .times(2)
            .returning(|_| Ok(sealed(1)));

        let err = Unsealer::new(path).unseal(&store).await.unwrap_err();
        assert!(matches!(err, Error::Irrecoverable(_)));
        assert!(err.to_string().contains("still sealed"));
    }

    #[tokio::test]
    async fn missing_share_file_is_irrecoverable() {
        let dir = tempfile::tempdir().unwrap();
        let store = MockSecretStore::new();

        let err = Unsealer::new(dir.path().join("resp-init.json"))
            .unseal(&store)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Irrecoverable(_)));
        assert!(err.to_string().contains("another instance"));
    }

    #[tokio::test]
    async fn rejected_share_is_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_shares(dir.path(), &["k1", "k2", "k3"]);

        let mut store = MockSecretStore::new();
        store
            .expect_unseal()
            .times(1)
            .returning(|_| Ok(StoreResponse::new(500, "internal error")));

        let err = Unsealer::new(path).unseal(&store).await.unwrap_err();
        assert!(err.is_recoverable());
    }
}
