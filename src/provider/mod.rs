//! Model vendors used by the model-call nodes
//!
//! # Example
//!
//! ```ignore
//! use nodeflow::provider::{HttpProviderFactory, ProviderFactory, GenerateRequest, Vendor};
//!
//! let factory = HttpProviderFactory::new(config.providers.clone());
//! let provider = factory.create(Vendor::OpenAi, &secret)?;
//!
//! let response = provider
//!     .generate(&GenerateRequest::new("You are a helpful assistant", "Hello"))
//!     .await?;
//! println!("{}", response.text);
//! ```

mod gemini;
#[cfg(test)]
pub(crate) mod mock;
mod openai;
mod types;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;
pub use types::{
    GenerateRequest, GenerateResponse, ModelProvider, ProviderError, ProviderFactory, TokenUsage,
    Vendor,
};

use crate::config::ProviderConfig;
use crate::credentials::Secret;
use std::collections::HashMap;

/// Builds HTTP providers from per-vendor configuration
///
/// A single `reqwest::Client` is shared so connections are pooled across
/// nodes and runs.
#[derive(Debug, Clone, Default)]
pub struct HttpProviderFactory {
    configs: HashMap<String, ProviderConfig>,
    client: reqwest::Client,
}

impl HttpProviderFactory {
    pub fn new(configs: HashMap<String, ProviderConfig>) -> Self {
        Self {
            configs,
            client: reqwest::Client::new(),
        }
    }

    pub fn config_for(&self, vendor: Vendor) -> ProviderConfig {
        self.configs.get(vendor.tag()).cloned().unwrap_or_default()
    }
}

impl ProviderFactory for HttpProviderFactory {
    fn create(
        &self,
        vendor: Vendor,
        api_key: &Secret,
    ) -> Result<Box<dyn ModelProvider>, ProviderError> {
        if api_key.expose().trim().is_empty() {
            return Err(ProviderError::config(format!("{} API key is empty", vendor)));
        }

        let config = self.config_for(vendor);
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| vendor.default_base_url().to_string());
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| vendor.default_model().to_string());

        let provider: Box<dyn ModelProvider> = match vendor {
            Vendor::OpenAi => Box::new(
                OpenAiProvider::new(self.client.clone(), api_key.expose())
                    .with_base_url(base_url)
                    .with_model(model)
                    .with_timeout(config.timeout()),
            ),
            Vendor::Gemini => Box::new(
                GeminiProvider::new(self.client.clone(), api_key.expose())
                    .with_base_url(base_url)
                    .with_model(model)
                    .with_timeout(config.timeout()),
            ),
        };
        Ok(provider)
    }
}
