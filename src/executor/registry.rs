//! Node-type tag to executor mapping

use super::{HttpRequestExecutor, ModelCallExecutor, NodeExecutor, NodeInput, TriggerExecutor};
use crate::engine::{ExecutionContext, WorkflowError};
use crate::provider::{ProviderFactory, Vendor};
use crate::status::StatusPublisher;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Built once at startup, then shared read-only across runs
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn NodeExecutor>>,
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("node_types", &self.node_types())
            .finish()
    }
}

impl ExecutorRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in node type
    pub fn standard(providers: Arc<dyn ProviderFactory>, http: HttpRequestExecutor) -> Self {
        let mut registry = Self::new();
        for tag in ["initial", "manual_trigger", "webhook_trigger"] {
            registry.register(tag, TriggerExecutor);
        }
        for vendor in Vendor::ALL {
            registry.register(vendor.tag(), ModelCallExecutor::new(vendor, Arc::clone(&providers)));
        }
        registry.register("http_request", http);
        registry
    }

    /// Add or replace the executor for a tag
    pub fn register(
        &mut self,
        tag: impl Into<String>,
        executor: impl NodeExecutor + 'static,
    ) -> &mut Self {
        self.executors.insert(tag.into(), Arc::new(executor));
        self
    }

    pub fn get(&self, tag: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(tag).cloned()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.executors.contains_key(tag)
    }

    /// Registered tags, sorted
    pub fn node_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Run one node inside the status lifecycle
    ///
    /// Publishes `loading`, then `success` or `error` depending on the
    /// outcome. An unregistered tag fails after `loading` is published. A
    /// retriable failure on an attempt that is not the last leaves the node
    /// at `loading`.
    #[instrument(
        skip_all,
        fields(node_id = %input.node.id, node_type = %input.node.node_type)
    )]
    pub async fn dispatch(
        &self,
        input: NodeInput<'_>,
        status: &StatusPublisher,
    ) -> Result<ExecutionContext, WorkflowError> {
        let node = input.node;
        status.loading(&node.id, &node.node_type);

        let result = match self.get(&node.node_type) {
            Some(executor) => executor.execute(input).await,
            None => Err(WorkflowError::UnknownNodeType(node.node_type.clone())),
        };

        match &result {
            Ok(_) => {
                info!("Node completed");
                status.success(&node.id, &node.node_type);
            }
            Err(e) if e.is_retryable() && !status.is_final_attempt() => {
                // Settled by the next attempt, or by the engine if none comes
                warn!(error = %e, "Node failed, holding status for retry");
            }
            Err(e) => {
                warn!(error = %e, "Node failed");
                status.error(&node.id, &node.node_type);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Node;
    use crate::executor::testing::Harness;
    use crate::provider::mock::MockFactory;
    use crate::status::{NodeStatus, StatusEvent, StatusHub};
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::broadcast;

    fn standard() -> ExecutorRegistry {
        ExecutorRegistry::standard(Arc::new(MockFactory::new()), HttpRequestExecutor::default())
    }

    struct Failing;

    #[async_trait]
    impl NodeExecutor for Failing {
        async fn execute(&self, _input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError> {
            Err(WorkflowError::InvalidInput("boom".into()))
        }
    }

    struct Flaky;

    #[async_trait]
    impl NodeExecutor for Flaky {
        async fn execute(&self, _input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError> {
            Err(WorkflowError::RetriableEffectError {
                step_key: "f:call".into(),
                message: "HTTP 503".into(),
            })
        }
    }

    fn statuses(rx: &mut broadcast::Receiver<StatusEvent>) -> Vec<NodeStatus> {
        let mut out = Vec::new();
        while let Ok(e) = rx.try_recv() {
            out.push(e.status);
        }
        out
    }

    #[test]
    fn test_standard_node_types() {
        assert_eq!(
            standard().node_types(),
            vec![
                "gemini",
                "http_request",
                "initial",
                "manual_trigger",
                "openai",
                "webhook_trigger"
            ]
        );
    }

    #[tokio::test]
    async fn test_dispatch_success_lifecycle() {
        let hub = StatusHub::default();
        let mut rx = hub.subscribe("run-1");
        let h = Harness::new().with_context(ExecutionContext::new().merged("a", json!(1)));
        let node = Node::new("start", "manual_trigger");

        let out = standard().dispatch(h.input(&node), &hub.publisher("run-1")).await.unwrap();

        assert_eq!(out.get("a"), Some(&json!(1)));
        assert_eq!(statuses(&mut rx), vec![NodeStatus::Loading, NodeStatus::Success]);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_type() {
        let hub = StatusHub::default();
        let mut rx = hub.subscribe("run-1");
        let h = Harness::new();
        let node = Node::new("x", "slack_message");

        let err = standard().dispatch(h.input(&node), &hub.publisher("run-1")).await.unwrap_err();

        assert!(matches!(err, WorkflowError::UnknownNodeType(ref t) if t == "slack_message"));
        assert_eq!(statuses(&mut rx), vec![NodeStatus::Loading, NodeStatus::Error]);
    }

    #[tokio::test]
    async fn test_dispatch_failure_lifecycle() {
        let hub = StatusHub::default();
        let mut rx = hub.subscribe("run-1");
        let mut registry = ExecutorRegistry::new();
        registry.register("failing", Failing);
        let h = Harness::new();
        let node = Node::new("f", "failing");

        assert!(registry.dispatch(h.input(&node), &hub.publisher("run-1")).await.is_err());
        assert_eq!(statuses(&mut rx), vec![NodeStatus::Loading, NodeStatus::Error]);
    }

    #[tokio::test]
    async fn test_retriable_failure_held_until_final_attempt() {
        let hub = StatusHub::default();
        let mut rx = hub.subscribe("run-1");
        let mut registry = ExecutorRegistry::new();
        registry.register("flaky", Flaky);
        let h = Harness::new();
        let node = Node::new("f", "flaky");
        let publisher = hub.publisher("run-1");

        publisher.set_final_attempt(false);
        assert!(registry.dispatch(h.input(&node), &publisher).await.is_err());
        assert_eq!(statuses(&mut rx), vec![NodeStatus::Loading]);

        publisher.set_final_attempt(true);
        assert!(registry.dispatch(h.input(&node), &publisher).await.is_err());
        assert_eq!(statuses(&mut rx), vec![NodeStatus::Error]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = standard();
        registry.register("openai", Failing);
        assert!(registry.contains("openai"));
        assert_eq!(registry.node_types().len(), 6);
    }

    #[test]
    fn test_field_metadata() {
        let registry = standard();
        let openai = registry.get("openai").unwrap();
        assert_eq!(openai.required_fields(), ["variableName", "userPrompt", "credentialId"]);
        assert_eq!(openai.template_fields(), ["systemPrompt", "userPrompt"]);

        let http = registry.get("http_request").unwrap();
        assert_eq!(http.required_fields(), ["variableName", "endpoint"]);

        let trigger = registry.get("manual_trigger").unwrap();
        assert!(trigger.required_fields().is_empty());
    }
}
