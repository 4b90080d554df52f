//! Scripted provider for tests

use super::types::{
    GenerateRequest, GenerateResponse, ModelProvider, ProviderError, ProviderFactory, Vendor,
};
use crate::credentials::Secret;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared state behind every provider a `MockFactory` hands out
#[derive(Debug, Default)]
pub struct MockState {
    calls: AtomicUsize,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<(Vendor, String, GenerateRequest)>>,
}

impl MockState {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests seen so far, with the vendor and API key used
    pub fn requests(&self) -> Vec<(Vendor, String, GenerateRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

/// Factory whose providers answer from a script, then echo the prompt
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    pub state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ok(&self, text: &str) -> &Self {
        self.state.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn push_err(&self, err: ProviderError) -> &Self {
        self.state.script.lock().unwrap().push_back(Err(err));
        self
    }
}

impl ProviderFactory for MockFactory {
    fn create(
        &self,
        vendor: Vendor,
        api_key: &Secret,
    ) -> Result<Box<dyn ModelProvider>, ProviderError> {
        Ok(Box::new(MockProvider {
            vendor,
            api_key: api_key.expose().to_string(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockProvider {
    vendor: Vendor,
    api_key: String,
    state: Arc<MockState>,
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, ProviderError> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .requests
            .lock()
            .unwrap()
            .push((self.vendor, self.api_key.clone(), request.clone()));

        let next = self.state.script.lock().unwrap().pop_front();
        let text = match next {
            Some(result) => result?,
            None => format!("echo: {}", request.user_prompt),
        };
        Ok(GenerateResponse::new(text, Duration::from_millis(1)))
    }

    fn name(&self) -> &str {
        self.vendor.tag()
    }
}
