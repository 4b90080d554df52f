//! Live per-node status for workflow runs
//!
//! Every dispatched node publishes `loading` followed by exactly one of
//! `success` or `error`, once per run even when attempts are retried.
//! Delivery is best-effort: subscribers that attach late miss earlier events
//! and slow subscribers may lag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default per-run channel capacity
pub const DEFAULT_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Loading,
    Success,
    Error,
}

impl NodeStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NodeStatus::Loading)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeStatus::Loading => "loading",
            NodeStatus::Success => "success",
            NodeStatus::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub run_id: String,
    pub node_id: String,
    pub node_type: String,
    pub status: NodeStatus,
    pub at: DateTime<Utc>,
}

/// Registry of per-run status channels
#[derive(Debug, Clone)]
pub struct StatusHub {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<StatusEvent>>>>,
    buffer: usize,
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl StatusHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            buffer: buffer.max(1),
        }
    }

    fn sender(&self, run_id: &str) -> broadcast::Sender<StatusEvent> {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels
            .entry(run_id.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .clone()
    }

    /// Receive events for a run from now on
    pub fn subscribe(&self, run_id: &str) -> broadcast::Receiver<StatusEvent> {
        self.sender(run_id).subscribe()
    }

    /// Create the publisher for a run; share it across retried attempts
    pub fn publisher(&self, run_id: &str) -> StatusPublisher {
        StatusPublisher {
            run_id: run_id.to_string(),
            sender: self.sender(run_id),
            last: Arc::new(Mutex::new(HashMap::new())),
            final_attempt: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Drop a run's channel; receivers see the stream end once drained
    pub fn close(&self, run_id: &str) {
        let mut channels = match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        channels.remove(run_id);
    }

    /// Number of runs with an open channel
    pub fn open_channels(&self) -> usize {
        match self.channels.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Publishes node transitions for one run
///
/// Enforces `loading -> success | error` per node, with at most one terminal
/// status per node for the life of the publisher. The engine keeps one
/// publisher across retried attempts: nodes replayed from the ledger are
/// not announced again, and a retriable failure on a non-final attempt
/// leaves the node at `loading` until a later attempt settles it.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    run_id: String,
    sender: broadcast::Sender<StatusEvent>,
    last: Arc<Mutex<HashMap<String, (NodeStatus, String)>>>,
    final_attempt: Arc<AtomicBool>,
}

impl StatusPublisher {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Mark whether the current attempt is the last one the run will get
    pub fn set_final_attempt(&self, is_final: bool) {
        self.final_attempt.store(is_final, Ordering::SeqCst);
    }

    pub fn is_final_attempt(&self) -> bool {
        self.final_attempt.load(Ordering::SeqCst)
    }

    pub fn loading(&self, node_id: &str, node_type: &str) -> bool {
        self.publish(node_id, node_type, NodeStatus::Loading)
    }

    pub fn success(&self, node_id: &str, node_type: &str) -> bool {
        self.publish(node_id, node_type, NodeStatus::Success)
    }

    pub fn error(&self, node_id: &str, node_type: &str) -> bool {
        self.publish(node_id, node_type, NodeStatus::Error)
    }

    /// Publish `error` for every node still left at `loading`
    ///
    /// Settles nodes whose failure was held back for a retry that never
    /// happened. Returns how many nodes were settled.
    pub fn fail_unsettled(&self) -> usize {
        let pending: Vec<(String, String)> = {
            let last = self.lock_last();
            last.iter()
                .filter(|(_, (status, _))| *status == NodeStatus::Loading)
                .map(|(node_id, (_, node_type))| (node_id.clone(), node_type.clone()))
                .collect()
        };
        pending
            .iter()
            .filter(|(node_id, node_type)| self.error(node_id, node_type))
            .count()
    }

    fn lock_last(&self) -> std::sync::MutexGuard<'_, HashMap<String, (NodeStatus, String)>> {
        match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Publish a transition, returning whether it was accepted
    pub fn publish(&self, node_id: &str, node_type: &str, status: NodeStatus) -> bool {
        {
            let mut last = self.lock_last();
            let previous = last.get(node_id).map(|(status, _)| *status);
            let allowed = match status {
                NodeStatus::Loading => previous.is_none(),
                NodeStatus::Success | NodeStatus::Error => previous == Some(NodeStatus::Loading),
            };
            if !allowed {
                let replay = matches!(
                    (previous, status),
                    (Some(NodeStatus::Loading), NodeStatus::Loading)
                        | (Some(NodeStatus::Success), NodeStatus::Loading | NodeStatus::Success)
                );
                if replay {
                    debug!(
                        run_id = %self.run_id,
                        node_id,
                        to = %status,
                        "Status already reported"
                    );
                } else {
                    warn!(
                        run_id = %self.run_id,
                        node_id,
                        from = ?previous,
                        to = %status,
                        "Dropping out-of-order status update"
                    );
                }
                return false;
            }
            last.insert(node_id.to_string(), (status, node_type.to_string()));
        }

        let event = StatusEvent {
            run_id: self.run_id.clone(),
            node_id: node_id.to_string(),
            node_type: node_type.to_string(),
            status,
            at: Utc::now(),
        };
        // No subscribers is fine
        let _ = self.sender.send(event);
        true
    }
}
