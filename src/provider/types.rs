//! Core types and traits for model providers

use crate::credentials::Secret;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error types that can occur while calling a model vendor
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Request timed out
    #[error("timeout after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// Rate limited by the vendor
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimit { retry_after: Option<Duration> },

    /// Authentication failed
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// Network error or vendor-side failure
    #[error("network error: {message}")]
    Network { message: String },

    /// Failed to parse response
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Vendor rejected the request as invalid
    #[error("request rejected: {message}")]
    Rejected { message: String },

    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl ProviderError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout { .. }
                | ProviderError::RateLimit { .. }
                | ProviderError::Network { .. }
        )
    }

    /// Get suggested retry delay for rate limit errors
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }

    pub fn timeout(elapsed: Duration) -> Self {
        Self::Timeout { elapsed }
    }

    pub fn rate_limit(retry_after: Option<Duration>) -> Self {
        Self::RateLimit { retry_after }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status to an error
    pub fn from_status(status: reqwest::StatusCode, body: &str, timeout: Duration) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 500));
        match status.as_u16() {
            401 | 403 => Self::auth(detail),
            429 => Self::rate_limit(parse_retry_after(body)),
            408 | 504 => Self::timeout(timeout),
            400..=499 => Self::rejected(detail),
            _ => Self::network(detail),
        }
    }

    /// Map a transport failure from reqwest
    pub fn from_transport(err: reqwest::Error, elapsed: Duration) -> Self {
        if err.is_timeout() {
            Self::timeout(elapsed)
        } else if err.is_connect() {
            Self::network(format!("connection failed: {}", err))
        } else {
            Self::network(format!("request failed: {}", err))
        }
    }
}

/// Try to parse a retry hint from an error response body
fn parse_retry_after(body: &str) -> Option<Duration> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_f64())
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Supported model vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Gemini,
}

impl Vendor {
    pub const ALL: [Vendor; 2] = [Vendor::OpenAi, Vendor::Gemini];

    /// Node type tag and configuration key for this vendor
    pub fn tag(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Gemini => "gemini",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "https://api.openai.com/v1",
            Vendor::Gemini => "https://generativelanguage.googleapis.com/v1beta",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "gpt-4",
            Vendor::Gemini => "gemini-2.0-flash",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Request for a single text generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub system_prompt: String,
    pub user_prompt: String,

    /// Model override; the provider's configured model is used otherwise
    pub model: Option<String>,
}

impl GenerateRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

/// Response from a text generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated text; empty when the vendor returned no text part
    pub text: String,

    /// Model that produced the text (if reported)
    pub model: Option<String>,

    pub usage: Option<TokenUsage>,

    /// Time taken by the call
    pub duration: Duration,
}

impl GenerateResponse {
    pub fn new(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            text: text.into(),
            model: None,
            usage: None,
            duration,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// A text-generation vendor
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError>;

    /// Get the provider name
    fn name(&self) -> &str;
}

#[async_trait]
impl ModelProvider for Box<dyn ModelProvider> {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Builds a provider for a vendor once its API key has been resolved
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        vendor: Vendor,
        api_key: &Secret,
    ) -> Result<Box<dyn ModelProvider>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::timeout(Duration::from_secs(30)).is_retryable());
        assert!(ProviderError::rate_limit(None).is_retryable());
        assert!(ProviderError::network("connection reset").is_retryable());

        assert!(!ProviderError::auth("invalid token").is_retryable());
        assert!(!ProviderError::parse("invalid json").is_retryable());
        assert!(!ProviderError::rejected("bad request").is_retryable());
        assert!(!ProviderError::config("no key").is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        let t = Duration::from_secs(5);
        let map = |code: u16| {
            ProviderError::from_status(StatusCode::from_u16(code).unwrap(), "body", t)
        };

        assert!(matches!(map(401), ProviderError::Auth { .. }));
        assert!(matches!(map(403), ProviderError::Auth { .. }));
        assert!(matches!(map(429), ProviderError::RateLimit { .. }));
        assert!(matches!(map(408), ProviderError::Timeout { .. }));
        assert!(matches!(map(504), ProviderError::Timeout { .. }));
        assert!(matches!(map(400), ProviderError::Rejected { .. }));
        assert!(matches!(map(404), ProviderError::Rejected { .. }));
        assert!(matches!(map(500), ProviderError::Network { .. }));
        assert!(matches!(map(503), ProviderError::Network { .. }));
    }

    #[test]
    fn test_rate_limit_retry_after() {
        let err = ProviderError::from_status(
            StatusCode::TOO_MANY_REQUESTS,
            r#"{"retry_after": 2.5}"#,
            Duration::from_secs(1),
        );
        assert_eq!(err.retry_after(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_long_error_body_truncated() {
        let body = "x".repeat(2000);
        let err = ProviderError::from_status(StatusCode::BAD_REQUEST, &body, Duration::ZERO);
        assert!(err.to_string().len() < 600);
    }

    #[test]
    fn test_vendor_tags() {
        assert_eq!(Vendor::OpenAi.tag(), "openai");
        assert_eq!(Vendor::Gemini.to_string(), "gemini");
        assert_eq!(Vendor::Gemini.default_model(), "gemini-2.0-flash");
    }

    #[test]
    fn test_generate_request_builder() {
        let request = GenerateRequest::new("You are terse", "Summarize").with_model("gpt-4o");
        assert_eq!(request.system_prompt, "You are terse");
        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
    }
}
