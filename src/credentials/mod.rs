//! Encrypted credentials scoped to workflow owners
//!
//! Values are stored encrypted and decrypted only when a node needs them.
//! Decrypted secrets are never persisted or logged.

mod cipher;
mod resolver;
mod store;

pub use cipher::{Cipher, CipherError};
pub use resolver::{CredentialError, CredentialResolver, Secret};
pub use store::{
    Credential, CredentialStore, InMemoryCredentialStore, SqliteCredentialStore, StoreError,
};

/// Environment variable holding the credential passphrase by default
pub const DEFAULT_KEY_ENV: &str = "NODEFLOW_ENCRYPTION_KEY";
