//! Node executors and the registry that dispatches to them
//!
//! Each node type tag maps to one [`NodeExecutor`]. Executors validate their
//! configuration, render templated fields, perform their effect inside a
//! durable step, and return the context extended with their output.

mod http_request;
mod model_call;
mod registry;
mod trigger;

pub use http_request::HttpRequestExecutor;
pub use model_call::{DEFAULT_SYSTEM_PROMPT, ModelCallExecutor};
pub use registry::ExecutorRegistry;
pub use trigger::TriggerExecutor;

use crate::config::Node;
use crate::credentials::CredentialResolver;
use crate::engine::{ExecutionContext, WorkflowError};
use crate::step::StepRunner;
use crate::template::TemplateEngine;
use async_trait::async_trait;

/// Everything an executor may use while running one node
#[derive(Debug, Clone, Copy)]
pub struct NodeInput<'a> {
    pub node: &'a Node,
    pub context: &'a ExecutionContext,
    pub owner_id: &'a str,
    pub steps: &'a StepRunner,
    pub templates: &'a TemplateEngine,
    pub credentials: &'a CredentialResolver,
}

impl<'a> NodeInput<'a> {
    /// Fetch required fields in order, failing on the first missing one
    pub fn require<const N: usize>(
        &self,
        fields: [&'static str; N],
    ) -> Result<[&'a str; N], WorkflowError> {
        let mut values = [""; N];
        for (slot, field) in values.iter_mut().zip(fields) {
            *slot = self
                .node
                .field(field)
                .ok_or_else(|| WorkflowError::missing(&self.node.id, field))?;
        }
        Ok(values)
    }

    /// Render a templated field against the current context
    pub fn render(&self, field: &str, template: &str) -> Result<String, WorkflowError> {
        self.templates
            .render_field(field, template, self.context)
            .map_err(|e| WorkflowError::template(&self.node.id, e))
    }

    /// Step key for this node's effect
    pub fn step_key(&self, suffix: &str) -> String {
        format!("{}:{}", self.node.id, suffix)
    }
}

/// A unit of work for one node type
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Run the node and return the updated context
    ///
    /// On error the caller's context is left as it was.
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError>;

    /// Fields that must be present and non-blank, in checking order
    fn required_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Fields rendered as templates; object values have each entry rendered
    fn template_fields(&self) -> &'static [&'static str] {
        &[]
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::credentials::{Cipher, Credential, InMemoryCredentialStore};
    use crate::step::{InMemoryLedger, StepLedger};
    use std::sync::Arc;

    /// Owned collaborators for building a `NodeInput` in tests
    pub struct Harness {
        pub ledger: Arc<InMemoryLedger>,
        pub steps: StepRunner,
        pub templates: TemplateEngine,
        pub credentials: CredentialResolver,
        pub context: ExecutionContext,
    }

    impl Harness {
        /// Credentials: `cred-1` owned by `owner-1`, holding `sk-test`
        pub fn new() -> Self {
            let cipher = Cipher::from_passphrase("harness-key").unwrap();
            let store = InMemoryCredentialStore::new();
            store.insert(Credential::new(
                "cred-1",
                "owner-1",
                "Test key",
                cipher.encrypt("sk-test").unwrap(),
            ));
            let ledger = Arc::new(InMemoryLedger::new());
            Self {
                steps: StepRunner::new("run-1", ledger.clone() as Arc<dyn StepLedger>),
                ledger,
                templates: TemplateEngine::new(),
                credentials: CredentialResolver::new(Arc::new(store), cipher),
                context: ExecutionContext::new(),
            }
        }

        pub fn with_context(mut self, context: ExecutionContext) -> Self {
            self.context = context;
            self
        }

        pub fn input<'a>(&'a self, node: &'a Node) -> NodeInput<'a> {
            NodeInput {
                node,
                context: &self.context,
                owner_id: "owner-1",
                steps: &self.steps,
                templates: &self.templates,
                credentials: &self.credentials,
            }
        }
    }

    #[test]
    fn test_require_reports_first_missing_in_order() {
        let h = Harness::new();
        let node = Node::new("n1", "openai").with("userPrompt", "hi").with("variableName", "  ");

        let err = h.input(&node).require(["variableName", "userPrompt"]).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MissingConfiguration { ref field, .. } if field == "variableName"
        ));
    }

    #[test]
    fn test_require_returns_values() {
        let h = Harness::new();
        let node = Node::new("n1", "openai").with("a", "1").with("b", "2");
        let [a, b] = h.input(&node).require(["a", "b"]).unwrap();
        assert_eq!((a, b), ("1", "2"));
    }

    #[test]
    fn test_step_key() {
        let h = Harness::new();
        let node = Node::new("n1", "openai");
        assert_eq!(h.input(&node).step_key("generate-text"), "n1:generate-text");
    }
}
