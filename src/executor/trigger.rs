//! Trigger nodes: the entry points of a workflow

use super::{NodeExecutor, NodeInput};
use crate::engine::{ExecutionContext, WorkflowError};
use async_trait::async_trait;
use serde_json::Value;

/// Pass-through executor for `initial`, `manual_trigger` and `webhook_trigger`
///
/// Records the context it saw as a step so the trigger appears in the
/// run's ledger, and returns the context unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct TriggerExecutor;

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(&self, input: NodeInput<'_>) -> Result<ExecutionContext, WorkflowError> {
        let snapshot = Value::Object(input.context.as_map().clone());
        input
            .steps
            .run(&input.step_key("trigger"), || async move { Ok(snapshot) })
            .await?;
        Ok(input.context.clone())
    }
}
