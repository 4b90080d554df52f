//! OpenAI-compatible chat completions provider

use super::types::{
    GenerateRequest, GenerateResponse, ModelProvider, ProviderError, TokenUsage, Vendor,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Provider for OpenAI-compatible chat completion APIs
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: Option<u32>,
    completion_tokens: Option<u32>,
    total_tokens: Option<u32>,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>) -> Self {
        Self {
            base_url: Vendor::OpenAi.default_base_url().to_string(),
            api_key: api_key.into(),
            model: Vendor::OpenAi.default_model().to_string(),
            timeout: Duration::from_secs(300),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the chat completion URL
    fn chat_completion_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{}/chat/completions", base)
    }

    fn build_body<'a>(&'a self, request: &'a GenerateRequest) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: request.model.as_deref().unwrap_or(&self.model),
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
        }
    }
}

#[async_trait]
impl ModelProvider for OpenAiProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        let start = Instant::now();

        let response = self
            .client
            .post(self.chat_completion_url())
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&self.build_body(request))
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, start.elapsed()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status, &body, self.timeout));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("failed to parse response: {}", e)))?;

        let text = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        let mut generated = GenerateResponse::new(text, start.elapsed());
        if let Some(model) = completion.model {
            generated = generated.with_model(model);
        }
        if let Some(usage) = completion.usage {
            generated = generated.with_usage(TokenUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        Ok(generated)
    }

    fn name(&self) -> &str {
        Vendor::OpenAi.tag()
    }
}
