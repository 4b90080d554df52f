//! Credential storage backends

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use thiserror::Error;

/// A stored credential; `encrypted_value` is never held in plaintext
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub encrypted_value: String,
    pub created_at: String,
}

impl Credential {
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        name: impl Into<String>,
        encrypted_value: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            encrypted_value: encrypted_value.into(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("failed to prepare credential database at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential {id} belongs to another owner")]
    OwnerMismatch { id: String },

    #[error("credential store lock poisoned")]
    Poisoned,
}

/// Read side of credential storage consumed by the engine
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a credential by id, scoped to its owner
    ///
    /// A credential owned by someone else is reported as absent.
    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<Credential>, StoreError>;
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS credentials (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        name TEXT NOT NULL,
        encrypted_value TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_credentials_owner ON credentials(owner_id);
"#;

/// SQLite-backed credential store
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open or create a credential database
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a credential, or replace one with the same id and owner
    ///
    /// An id already held by another owner is rejected and left untouched.
    pub fn insert(&self, credential: &Credential) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let changed = conn.execute(
            "INSERT INTO credentials (id, owner_id, name, encrypted_value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                encrypted_value = excluded.encrypted_value
             WHERE credentials.owner_id = excluded.owner_id",
            (
                &credential.id,
                &credential.owner_id,
                &credential.name,
                &credential.encrypted_value,
                &credential.created_at,
            ),
        )?;
        if changed == 0 {
            return Err(StoreError::OwnerMismatch {
                id: credential.id.clone(),
            });
        }
        Ok(())
    }

    /// List an owner's credentials, oldest first
    pub fn list(&self, owner_id: &str) -> Result<Vec<Credential>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let mut stmt = conn.prepare(
            "SELECT id, owner_id, name, encrypted_value, created_at
             FROM credentials WHERE owner_id = ?1
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([owner_id], row_to_credential)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }
}

fn row_to_credential(row: &rusqlite::Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        encrypted_value: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        let credential = conn
            .query_row(
                "SELECT id, owner_id, name, encrypted_value, created_at
                 FROM credentials WHERE id = ?1 AND owner_id = ?2",
                [id, owner_id],
                row_to_credential,
            )
            .optional()?;
        Ok(credential)
    }
}

/// Process-local credential store
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, credential: Credential) {
        let mut map = self.credentials.write().unwrap_or_else(|e| e.into_inner());
        map.insert(credential.id.clone(), credential);
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn fetch(&self, id: &str, owner_id: &str) -> Result<Option<Credential>, StoreError> {
        let map = self.credentials.read().map_err(|_| StoreError::Poisoned)?;
        Ok(map.get(id).filter(|c| c.owner_id == owner_id).cloned())
    }
}
