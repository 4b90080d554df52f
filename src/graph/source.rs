//! Read-only access to stored workflow definitions

use crate::config::WorkflowDefinition;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Errors from a graph source
#[derive(Debug, Error)]
pub enum GraphSourceError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },

    #[error("workflow '{id}' is invalid:\n  {}", .errors.join("\n  "))]
    Invalid { id: String, errors: Vec<String> },
}

/// Where workflow graphs come from
#[async_trait]
pub trait GraphSource: Send + Sync {
    /// Fetch a workflow definition, `Ok(None)` if it doesn't exist
    async fn load(&self, workflow_id: &str) -> Result<Option<WorkflowDefinition>, GraphSourceError>;
}

/// Loads `<id>.toml` or `<id>.json` from a directory
#[derive(Debug, Clone)]
pub struct FileGraphSource {
    dir: PathBuf,
}

impl FileGraphSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidate_paths(&self, workflow_id: &str) -> [PathBuf; 2] {
        [
            self.dir.join(format!("{}.toml", workflow_id)),
            self.dir.join(format!("{}.json", workflow_id)),
        ]
    }
}

/// Parse and validate a single definition file
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, GraphSourceError> {
    let contents = std::fs::read_to_string(path).map_err(|source| GraphSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let parse_err = |message: String| GraphSourceError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let workflow: WorkflowDefinition = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
        _ => toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))?,
    };

    workflow
        .validate()
        .map_err(|errors| GraphSourceError::Invalid {
            id: workflow.id.clone(),
            errors,
        })?;

    Ok(workflow)
}

#[async_trait]
impl GraphSource for FileGraphSource {
    async fn load(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowDefinition>, GraphSourceError> {
        // Ids come from callers; keep them inside the directory.
        if workflow_id.is_empty()
            || workflow_id.contains(['/', '\\'])
            || workflow_id.starts_with('.')
        {
            return Ok(None);
        }

        for path in self.candidate_paths(workflow_id) {
            if path.exists() {
                tracing::debug!(path = %path.display(), "Loading workflow definition");
                return load_workflow_file(&path).map(Some);
            }
        }
        Ok(None)
    }
}

/// Definitions held in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct InMemoryGraphSource {
    workflows: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl InMemoryGraphSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition
    pub fn insert(&self, workflow: WorkflowDefinition) {
        let mut workflows = self.workflows.write().unwrap_or_else(|e| e.into_inner());
        workflows.insert(workflow.id.clone(), workflow);
    }
}

#[async_trait]
impl GraphSource for InMemoryGraphSource {
    async fn load(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowDefinition>, GraphSourceError> {
        let workflows = self.workflows.read().unwrap_or_else(|e| e.into_inner());
        Ok(workflows.get(workflow_id).cloned())
    }
}
