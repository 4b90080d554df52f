//! Configuration loading with multi-layer merge

use super::ProviderConfig;
use crate::credentials::DEFAULT_KEY_ENV;
use crate::engine::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level nodeflow configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Global defaults
    #[serde(default)]
    pub defaults: Defaults,

    /// Credential storage
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Per-vendor settings, keyed by node type tag (`openai`, `gemini`)
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Global default settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Directory holding `<id>.toml` / `<id>.json` workflow definitions
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,

    /// SQLite step ledger; runs are only resumable within one process when unset
    pub ledger_path: Option<String>,

    /// Attempts per run, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds for exponential backoff between attempts
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,

    /// Per-run status channel capacity
    #[serde(default = "default_status_buffer")]
    pub status_buffer: usize,
}

fn default_workflows_dir() -> String {
    "workflows".into()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000 // 1 second
}

fn default_status_buffer() -> usize {
    crate::status::DEFAULT_BUFFER
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            workflows_dir: default_workflows_dir(),
            ledger_path: None,
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
            status_buffer: default_status_buffer(),
        }
    }
}

/// Where credentials live and how they are decrypted
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// SQLite credential database
    #[serde(default = "default_credentials_db")]
    pub database: String,

    /// Environment variable holding the encryption passphrase
    #[serde(default = "default_key_env")]
    pub key_env: String,
}

fn default_credentials_db() -> String {
    "~/.config/nodeflow/credentials.db".into()
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.into()
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            database: default_credentials_db(),
            key_env: default_key_env(),
        }
    }
}

/// Expand `~` and resolve relative paths against `base`
fn resolve_path(raw: &str, base: Option<&Path>) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw).into_owned());
    match base {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

impl EngineConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/nodeflow/config.toml
    /// 3. .nodeflow/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".nodeflow/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".nodeflow/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/nodeflow/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("nodeflow/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        if other.defaults.workflows_dir != default_workflows_dir() {
            self.defaults.workflows_dir = other.defaults.workflows_dir;
        }
        if other.defaults.ledger_path.is_some() {
            self.defaults.ledger_path = other.defaults.ledger_path;
        }
        if other.defaults.max_attempts != default_max_attempts() {
            self.defaults.max_attempts = other.defaults.max_attempts;
        }
        if other.defaults.retry_delay_ms != default_retry_delay() {
            self.defaults.retry_delay_ms = other.defaults.retry_delay_ms;
        }
        if other.defaults.status_buffer != default_status_buffer() {
            self.defaults.status_buffer = other.defaults.status_buffer;
        }

        if other.credentials.database != default_credentials_db() {
            self.credentials.database = other.credentials.database;
        }
        if other.credentials.key_env != default_key_env() {
            self.credentials.key_env = other.credentials.key_env;
        }

        // Other wins for same vendor
        for (name, provider) in other.providers {
            self.providers.insert(name, provider);
        }
    }

    pub fn workflows_dir(&self, project_dir: Option<&Path>) -> PathBuf {
        resolve_path(&self.defaults.workflows_dir, project_dir)
    }

    pub fn ledger_path(&self, project_dir: Option<&Path>) -> Option<PathBuf> {
        self.defaults
            .ledger_path
            .as_deref()
            .map(|raw| resolve_path(raw, project_dir))
    }

    pub fn credentials_db(&self, project_dir: Option<&Path>) -> PathBuf {
        resolve_path(&self.credentials.database, project_dir)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.defaults.max_attempts,
            Duration::from_millis(self.defaults.retry_delay_ms),
        )
    }

    /// Get a vendor's settings by tag
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}
