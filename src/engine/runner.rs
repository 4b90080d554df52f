//! Workflow orchestration

use super::cancel::CancellationToken;
use super::context::ExecutionContext;
use super::error::WorkflowError;
use super::retry::RetryPolicy;
use crate::config::Node;
use crate::credentials::CredentialResolver;
use crate::executor::{ExecutorRegistry, NodeInput};
use crate::graph::{GraphSource, sort_nodes};
use crate::status::{StatusEvent, StatusHub, StatusPublisher};
use crate::step::{StepLedger, StepRunner};
use crate::template::TemplateEngine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Span, debug, info, instrument, warn};

/// Step key under which the sorted node list is memoised
pub const PREPARE_STEP: &str = "prepare-workflow";

/// Request to run a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub workflow_id: String,

    /// Seed for the execution context; must be a JSON object when present
    #[serde(default)]
    pub initial_data: Option<Value>,

    /// Reuse a run id to resume it; a fresh id is generated otherwise
    #[serde(default)]
    pub run_id: Option<String>,
}

impl RunRequest {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            ..Default::default()
        }
    }

    pub fn with_initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub workflow_id: String,
    pub run_id: String,
    pub result: ExecutionContext,
}

/// Runs workflows one node at a time in dependency order
#[derive(Clone)]
pub struct WorkflowEngine {
    graphs: Arc<dyn GraphSource>,
    registry: Arc<ExecutorRegistry>,
    ledger: Arc<dyn StepLedger>,
    credentials: CredentialResolver,
    templates: TemplateEngine,
    status: StatusHub,
    retry: RetryPolicy,
}

impl WorkflowEngine {
    pub fn new(
        graphs: Arc<dyn GraphSource>,
        registry: Arc<ExecutorRegistry>,
        ledger: Arc<dyn StepLedger>,
        credentials: CredentialResolver,
    ) -> Self {
        Self {
            graphs,
            registry,
            ledger,
            credentials,
            templates: TemplateEngine::new(),
            status: StatusHub::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_status_hub(mut self, status: StatusHub) -> Self {
        self.status = status;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn status_hub(&self) -> &StatusHub {
        &self.status
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    /// Attach a status subscriber to a run
    ///
    /// Subscribe before starting the run. The channel is released when the
    /// run finishes, which ends the stream once buffered events are read.
    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe(run_id)
    }

    /// Make one attempt at a run
    #[instrument(
        skip_all,
        fields(workflow_id = %request.workflow_id, run_id = tracing::field::Empty)
    )]
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, WorkflowError> {
        let run_id = resolve_run_id(request);
        Span::current().record("run_id", run_id.as_str());

        let publisher = self.status.publisher(&run_id);
        let result = self.attempt(request, &run_id, &publisher, cancel).await;
        self.finish(&run_id, &publisher, result)
    }

    /// Run, re-attempting with the same run id while failures are retriable
    ///
    /// Steps completed by earlier attempts are replayed from the ledger. One
    /// status publisher spans every attempt, so each node reports a single
    /// terminal status for the whole run.
    #[instrument(
        skip_all,
        fields(workflow_id = %request.workflow_id, run_id = tracing::field::Empty)
    )]
    pub async fn run_with_retry(
        &self,
        request: &RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunResult, WorkflowError> {
        let run_id = resolve_run_id(request);
        Span::current().record("run_id", run_id.as_str());

        let publisher = self.status.publisher(&run_id);
        let result = self.retry_loop(request, &run_id, &publisher, cancel).await;
        self.finish(&run_id, &publisher, result)
    }

    async fn retry_loop(
        &self,
        request: &RunRequest,
        run_id: &str,
        publisher: &StatusPublisher,
        cancel: &CancellationToken,
    ) -> Result<RunResult, WorkflowError> {
        let mut attempt = 0;
        loop {
            publisher.set_final_attempt(attempt + 1 >= self.retry.max_attempts);
            match self.attempt(request, run_id, publisher, cancel).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Run failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Settle held-back node failures and release the run's status channel
    fn finish(
        &self,
        run_id: &str,
        publisher: &StatusPublisher,
        result: Result<RunResult, WorkflowError>,
    ) -> Result<RunResult, WorkflowError> {
        if result.is_err() {
            let settled = publisher.fail_unsettled();
            if settled > 0 {
                debug!(settled, "Reported held-back node failures");
            }
        }
        self.status.close(run_id);
        result
    }

    async fn attempt(
        &self,
        request: &RunRequest,
        run_id: &str,
        publisher: &StatusPublisher,
        cancel: &CancellationToken,
    ) -> Result<RunResult, WorkflowError> {
        let mut context = ExecutionContext::from_initial(request.initial_data.clone())
            .map_err(|rejected| {
                WorkflowError::InvalidInput(format!(
                    "initial data must be an object, got {}",
                    json_kind(&rejected)
                ))
            })?;

        let definition = self
            .graphs
            .load(&request.workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::WorkflowNotFound(request.workflow_id.clone()))?;

        let sorted = sort_nodes(&definition.nodes, &definition.connections)?;
        let steps = StepRunner::new(run_id, Arc::clone(&self.ledger));
        let ordered: Vec<Node> = steps
            .run_json(PREPARE_STEP, || async move { Ok(sorted) })
            .await?;

        info!(nodes = ordered.len(), "Starting workflow run");

        for node in &ordered {
            if cancel.is_cancelled() {
                info!(next_node = %node.id, "Run cancelled");
                return Err(WorkflowError::Cancelled);
            }

            let input = NodeInput {
                node,
                context: &context,
                owner_id: &definition.owner_id,
                steps: &steps,
                templates: &self.templates,
                credentials: &self.credentials,
            };
            context = self.registry.dispatch(input, publisher).await?;
            debug!(node_id = %node.id, keys = context.len(), "Context updated");
        }

        info!("Workflow run completed");
        Ok(RunResult {
            workflow_id: request.workflow_id.clone(),
            run_id: run_id.to_string(),
            result: context,
        })
    }
}

fn resolve_run_id(request: &RunRequest) -> String {
    request
        .run_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
