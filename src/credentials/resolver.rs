//! Owner-scoped credential lookup and decryption

use super::cipher::{Cipher, CipherError};
use super::store::{CredentialStore, StoreError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// A decrypted credential value
///
/// Only ever held in memory for the duration of a call; `Debug` output is
/// redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Missing, or owned by someone else; the two are indistinguishable
    #[error("credential not found: {id}")]
    NotFound { id: String },

    #[error("credential {id} could not be decrypted: {source}")]
    Unreadable {
        id: String,
        #[source]
        source: CipherError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fetches a credential for an owner and decrypts it
#[derive(Clone)]
pub struct CredentialResolver {
    store: Arc<dyn CredentialStore>,
    cipher: Result<Cipher, CipherError>,
}

impl CredentialResolver {
    pub fn new(store: Arc<dyn CredentialStore>, cipher: Cipher) -> Self {
        Self {
            store,
            cipher: Ok(cipher),
        }
    }

    /// Build a resolver whose key comes from an environment variable
    ///
    /// A missing key is not an error here; it surfaces as `Unreadable` the
    /// first time a credential is resolved, so credential-free workflows
    /// still run.
    pub fn from_env(store: Arc<dyn CredentialStore>, key_env: &str) -> Self {
        Self {
            store,
            cipher: Cipher::from_env(key_env),
        }
    }

    pub async fn resolve(
        &self,
        credential_id: &str,
        owner_id: &str,
    ) -> Result<Secret, CredentialError> {
        let not_found = || CredentialError::NotFound {
            id: credential_id.to_string(),
        };

        let credential = self
            .store
            .fetch(credential_id, owner_id)
            .await?
            .ok_or_else(not_found)?;
        if credential.owner_id != owner_id {
            return Err(not_found());
        }

        let cipher = self.cipher.as_ref().map_err(|e| CredentialError::Unreadable {
            id: credential_id.to_string(),
            source: e.clone(),
        })?;
        let value = cipher
            .decrypt(&credential.encrypted_value)
            .map_err(|source| CredentialError::Unreadable {
                id: credential_id.to_string(),
                source,
            })?;

        debug!(credential_id, "Resolved credential");
        Ok(Secret::new(value))
    }
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("key_loaded", &self.cipher.is_ok())
            .finish_non_exhaustive()
    }
}
