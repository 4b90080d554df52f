//! Text generation nodes backed by a model vendor

use super::{NodeExecutor, NodeInput};
use crate::engine::{ExecutionContext, WorkflowError};
use crate::provider::{GenerateRequest, ProviderError, ProviderFactory, Vendor};
use crate::step::EffectError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant";

const REQUIRED: [&str; 3] = ["variableName", "userPrompt", "credentialId"];

impl From<ProviderError> for EffectError {
    fn from(err: ProviderError) -> Self {
        if err.is_retryable() {
            EffectError::retriable(err.to_string())
        } else {
            EffectError::permanent(err.to_string())
        }
    }
}

/// Executor for `openai` and `gemini` nodes
///
/// Required fields, checked in order: `variableName`, `userPrompt`,
/// `credentialId`. Optional: `systemPrompt`, `model`. Writes
/// `{variableName: {text}}` into the context.
#[derive(Clone)]
pub struct ModelCallExecutor {
    vendor: Vendor,
    providers: Arc<dyn ProviderFactory>,
}

impl ModelCallExecutor {
    pub fn new(vendor: Vendor, providers: Arc<dyn ProviderFactory>) -> Self {
        Self { vendor, providers }
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }
}

#[async_trait]
impl NodeExecutor for ModelCallExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError> {
        let [variable_name, user_prompt, credential_id] = input.require(REQUIRED)?;

        let system_prompt = match input.node.field("systemPrompt") {
            Some(template) => input.render("systemPrompt", template)?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };
        let user_prompt = input.render("userPrompt", user_prompt)?;
        debug!(
            node_id = %input.node.id,
            system_len = system_prompt.len(),
            user_len = user_prompt.len(),
            "Rendered prompts"
        );

        let mut request = GenerateRequest::new(system_prompt, user_prompt);
        if let Some(model) = input.node.field("model") {
            request = request.with_model(model);
        }

        let step_key = input.step_key("generate-text");
        if let Some(result) = input.steps.completed(&step_key)? {
            debug!(node_id = %input.node.id, %step_key, "Replaying recorded generation");
            return Ok(input.context.merged(variable_name, result));
        }

        // Resolved only when the call happens; the key never enters the ledger
        let api_key = input.credentials.resolve(credential_id, input.owner_id).await?;

        let vendor = self.vendor;
        let providers = Arc::clone(&self.providers);
        let result = input
            .steps
            .run(&step_key, || async move {
                let provider = providers.create(vendor, &api_key)?;
                let response = provider.generate(&request).await?;
                Ok(json!({ "text": response.text }))
            })
            .await?;

        Ok(input.context.merged(variable_name, result))
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &REQUIRED
    }

    fn template_fields(&self) -> &'static [&'static str] {
        &["systemPrompt", "userPrompt"]
    }
}
