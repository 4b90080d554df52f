//! Workflow execution engine
//!
//! Loads a workflow graph, orders it, and walks the nodes strictly one after
//! another, threading an [`ExecutionContext`] from node to node. Effects run
//! inside durable steps so a retried run skips work that already completed.
//!
//! # Example
//!
//! ```ignore
//! use nodeflow::engine::{CancellationToken, RunRequest, WorkflowEngine};
//!
//! let engine = WorkflowEngine::new(graphs, registry, ledger, credentials);
//! let request = RunRequest::new("daily-summary").with_initial_data(json!({"name": "Sam"}));
//!
//! let result = engine.run_with_retry(&request, &CancellationToken::new()).await?;
//! println!("{}", serde_json::to_string_pretty(&result.result)?);
//! ```

mod cancel;
mod context;
mod error;
mod retry;
mod runner;

pub use cancel::CancellationToken;
pub use context::ExecutionContext;
pub use error::WorkflowError;
pub use retry::RetryPolicy;
pub use runner::{PREPARE_STEP, RunRequest, RunResult, WorkflowEngine};
