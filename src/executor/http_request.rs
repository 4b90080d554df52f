//! Outbound HTTP request nodes

use super::{NodeExecutor, NodeInput};
use crate::engine::{ExecutionContext, WorkflowError};
use crate::step::EffectError;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::debug;

const REQUIRED: [&str; 2] = ["variableName", "endpoint"];

/// Executor for `http_request` nodes
///
/// Required fields, checked in order: `variableName`, `endpoint`. Optional:
/// `method` (default `GET`), `body` (sent for POST, PUT and PATCH),
/// `headers` (object of string values). Endpoint, body and header values are
/// templates. Writes `{variableName: {httpResponse: {status, statusText,
/// data}}}`.
#[derive(Debug, Clone)]
pub struct HttpRequestExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl Default for HttpRequestExecutor {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl HttpRequestExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn parse_method(node_id: &str, raw: Option<&str>) -> Result<Method, WorkflowError> {
    let name = raw.map(|m| m.trim().to_ascii_uppercase()).unwrap_or_else(|| "GET".into());
    match name.as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "PATCH" => Ok(Method::PATCH),
        "DELETE" => Ok(Method::DELETE),
        "HEAD" => Ok(Method::HEAD),
        other => Err(WorkflowError::InvalidInput(format!(
            "node {}: unsupported HTTP method '{}'",
            node_id, other
        ))),
    }
}

fn sends_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT || *method == Method::PATCH
}

/// Classify a non-success status the same way model vendors are classified
fn status_error(status: reqwest::StatusCode, body: &str) -> EffectError {
    let message = format!("HTTP {}: {}", status, body.chars().take(500).collect::<String>());
    match status.as_u16() {
        408 | 429 | 500..=599 => EffectError::retriable(message),
        _ => EffectError::permanent(message),
    }
}

/// Response body as JSON when it parses, otherwise as a string
fn decode_body(text: String) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl NodeExecutor for HttpRequestExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError> {
        let [variable_name, endpoint] = input.require(REQUIRED)?;
        let method = parse_method(&input.node.id, input.node.field("method"))?;

        let url = input.render("endpoint", endpoint)?;
        let url = reqwest::Url::parse(url.trim()).map_err(|e| {
            WorkflowError::InvalidInput(format!("node {}: invalid endpoint: {}", input.node.id, e))
        })?;

        let body = match input.node.field("body") {
            Some(template) if sends_body(&method) => Some(input.render("body", template)?),
            _ => None,
        };

        let mut headers = Vec::new();
        if let Some(Value::Object(map)) = input.node.data.get("headers") {
            for (name, value) in map {
                let template = value.as_str().ok_or_else(|| {
                    WorkflowError::InvalidInput(format!(
                        "node {}: header '{}' must be a string",
                        input.node.id, name
                    ))
                })?;
                headers.push((name.clone(), input.render(name, template)?));
            }
        }

        debug!(node_id = %input.node.id, %method, %url, "Prepared HTTP request");

        let client = self.client.clone();
        let timeout = self.timeout;
        let result = input
            .steps
            .run(&input.step_key("http-request"), || async move {
                let start = Instant::now();
                let mut request = client.request(method, url).timeout(timeout);
                for (name, value) in &headers {
                    request = request.header(name.as_str(), value.as_str());
                }
                if let Some(body) = body {
                    request = match serde_json::from_str::<Value>(&body) {
                        Ok(json) => request.json(&json),
                        Err(_) => request.body(body),
                    };
                }

                let response = request.send().await.map_err(|e| {
                    if e.is_builder() {
                        EffectError::permanent(format!("invalid request: {}", e))
                    } else {
                        EffectError::retriable(format!(
                            "request failed after {:?}: {}",
                            start.elapsed(),
                            e
                        ))
                    }
                })?;

                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| {
                        EffectError::retriable(format!("failed to read response: {}", e))
                    })?;
                if !status.is_success() {
                    return Err(status_error(status, &text));
                }

                Ok(json!({
                    "httpResponse": {
                        "status": status.as_u16(),
                        "statusText": status.canonical_reason().unwrap_or_default(),
                        "data": decode_body(text),
                    }
                }))
            })
            .await?;

        Ok(input.context.merged(variable_name, result))
    }

    fn required_fields(&self) -> &'static [&'static str] {
        &REQUIRED
    }

    fn template_fields(&self) -> &'static [&'static str] {
        &["endpoint", "body", "headers"]
    }
}
