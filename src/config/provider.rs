//! Model vendor configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a single model vendor
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// API base URL; the vendor's public endpoint when unset
    pub base_url: Option<String>,

    /// Model used when a node does not name one
    pub model: Option<String>,

    /// Timeout in seconds for requests
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    300 // 5 minutes
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            model: None,
            timeout: default_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
