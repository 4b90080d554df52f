//! Errors surfaced by workflow runs

use crate::credentials::CredentialError;
use crate::graph::{GraphSourceError, SortError};
use crate::step::{EffectError, LedgerError, StepError};
use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow contains a cycle through: {}", nodes.join(", "))]
    CycleDetected { nodes: Vec<String> },

    #[error("invalid workflow graph: {0}")]
    InvalidGraph(String),

    #[error("unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("node {node_id}: {field} is missing")]
    MissingConfiguration { node_id: String, field: String },

    #[error("credential not found: {id}")]
    CredentialNotFound { id: String },

    #[error("credential {id} could not be decrypted: {reason}")]
    CredentialUnreadable { id: String, reason: String },

    #[error("node {node_id}: {source}")]
    TemplateCompileError {
        node_id: String,
        #[source]
        source: TemplateError,
    },

    #[error("step {step_key} failed (retriable): {message}")]
    RetriableEffectError { step_key: String, message: String },

    #[error("step {step_key} failed: {message}")]
    NonRetriableEffectError { step_key: String, message: String },

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("run cancelled")]
    Cancelled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(String),
}

impl WorkflowError {
    /// Whether re-running the workflow with the same run id may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::RetriableEffectError { .. }
                | WorkflowError::Ledger(_)
                | WorkflowError::Store(_)
        )
    }

    pub fn missing(node_id: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            node_id: node_id.into(),
            field: field.into(),
        }
    }

    pub fn template(node_id: impl Into<String>, source: TemplateError) -> Self {
        Self::TemplateCompileError {
            node_id: node_id.into(),
            source,
        }
    }
}

impl From<SortError> for WorkflowError {
    fn from(err: SortError) -> Self {
        match err {
            SortError::CycleDetected { nodes } => Self::CycleDetected { nodes },
            other => Self::InvalidGraph(other.to_string()),
        }
    }
}

impl From<CredentialError> for WorkflowError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::NotFound { id } => Self::CredentialNotFound { id },
            CredentialError::Unreadable { id, source } => Self::CredentialUnreadable {
                id,
                reason: source.to_string(),
            },
            CredentialError::Store(e) => Self::Store(e.to_string()),
        }
    }
}

impl From<StepError> for WorkflowError {
    fn from(err: StepError) -> Self {
        match err {
            StepError::Effect {
                key,
                source: EffectError::Retriable(message),
            } => Self::RetriableEffectError {
                step_key: key,
                message,
            },
            StepError::Effect {
                key,
                source: EffectError::Permanent(message),
            } => Self::NonRetriableEffectError {
                step_key: key,
                message,
            },
            StepError::Ledger(e) => Self::Ledger(e),
        }
    }
}

impl From<GraphSourceError> for WorkflowError {
    fn from(err: GraphSourceError) -> Self {
        match err {
            GraphSourceError::Io { .. } => Self::Store(err.to_string()),
            GraphSourceError::Parse { .. } | GraphSourceError::Invalid { .. } => {
                Self::InvalidGraph(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepError;

    #[test]
    fn test_retry_classification() {
        let retriable = WorkflowError::RetriableEffectError {
            step_key: "n:generate-text".into(),
            message: "503".into(),
        };
        assert!(retriable.is_retryable());
        assert!(WorkflowError::Store("locked".into()).is_retryable());

        assert!(!WorkflowError::CycleDetected { nodes: vec![] }.is_retryable());
        assert!(!WorkflowError::UnknownNodeType("x".into()).is_retryable());
        assert!(!WorkflowError::missing("n", "userPrompt").is_retryable());
        assert!(!WorkflowError::CredentialNotFound { id: "c".into() }.is_retryable());
        assert!(!WorkflowError::WorkflowNotFound("w".into()).is_retryable());
        assert!(!WorkflowError::Cancelled.is_retryable());
    }

    #[test]
    fn test_from_sort_error() {
        let err: WorkflowError = SortError::CycleDetected {
            nodes: vec!["a".into(), "b".into()],
        }
        .into();
        assert_eq!(err.to_string(), "workflow contains a cycle through: a, b");

        let err: WorkflowError = SortError::DuplicateNode("a".into()).into();
        assert!(matches!(err, WorkflowError::InvalidGraph(_)));
    }

    #[test]
    fn test_from_step_error() {
        let err: WorkflowError = StepError::Effect {
            key: "k".into(),
            source: EffectError::permanent("401"),
        }
        .into();
        assert!(matches!(err, WorkflowError::NonRetriableEffectError { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_credential_error() {
        let err: WorkflowError = CredentialError::NotFound { id: "c1".into() }.into();
        assert_eq!(err.to_string(), "credential not found: c1");
    }

    #[test]
    fn test_missing_configuration_message() {
        let err = WorkflowError::missing("node-1", "variableName");
        assert_eq!(err.to_string(), "node node-1: variableName is missing");
    }
}
