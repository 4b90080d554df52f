//! nodeflow: a workflow automation runtime
//!
//! Workflows are directed graphs of typed nodes (triggers, model calls, HTTP
//! requests). The [`engine::WorkflowEngine`] orders a graph, dispatches each
//! node to its executor, threads the accumulating context from node to node,
//! and publishes live per-node status. Effects run inside durable steps so a
//! retried run never repeats completed work.

pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod executor;
pub mod graph;
pub mod logging;
pub mod provider;
pub mod status;
pub mod step;
pub mod template;
