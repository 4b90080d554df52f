//! CLI command implementations

use super::output::{OutputEvent, OutputHandler};
use crate::config::{EngineConfig, WorkflowDefinition};
use crate::credentials::{Cipher, Credential, CredentialResolver, SqliteCredentialStore};
use crate::engine::{CancellationToken, RunRequest, WorkflowEngine, WorkflowError};
use crate::executor::{ExecutorRegistry, HttpRequestExecutor};
use crate::graph::{FileGraphSource, GraphSource, load_workflow_file, sort_nodes};
use crate::provider::{HttpProviderFactory, Vendor};
use crate::status::StatusHub;
use crate::step::{InMemoryLedger, SqliteLedger, StepLedger};
use crate::template::TemplateEngine;
use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Exit code for a run stopped by a signal
const EXIT_CANCELLED: i32 = 130;

/// Registry with every built-in node type, configured from `config`
pub fn build_registry(config: &EngineConfig) -> ExecutorRegistry {
    let providers = Arc::new(HttpProviderFactory::new(config.providers.clone()));
    ExecutorRegistry::standard(providers, HttpRequestExecutor::default())
}

/// Wire up an engine from configuration
///
/// Without a configured `ledger_path` the ledger lives in memory, so retries
/// within this process still skip completed steps but a restart does not.
pub fn build_engine(config: &EngineConfig, project_dir: Option<&Path>) -> Result<WorkflowEngine> {
    let graphs = Arc::new(FileGraphSource::new(config.workflows_dir(project_dir)));

    let ledger: Arc<dyn StepLedger> = match config.ledger_path(project_dir) {
        Some(path) => Arc::new(
            SqliteLedger::open(&path)
                .with_context(|| format!("opening step ledger {}", path.display()))?,
        ),
        None => Arc::new(InMemoryLedger::new()),
    };

    let store = open_credential_store(config, project_dir)?;
    let credentials = CredentialResolver::from_env(Arc::new(store), &config.credentials.key_env);

    Ok(
        WorkflowEngine::new(graphs, Arc::new(build_registry(config)), ledger, credentials)
            .with_status_hub(StatusHub::new(config.defaults.status_buffer))
            .with_retry_policy(config.retry_policy()),
    )
}

fn open_credential_store(
    config: &EngineConfig,
    project_dir: Option<&Path>,
) -> Result<SqliteCredentialStore> {
    let path = config.credentials_db(project_dir);
    SqliteCredentialStore::open(&path)
        .with_context(|| format!("opening credential database {}", path.display()))
}

/// Run a workflow, streaming node status to the handler
pub async fn run_workflow(
    engine: &WorkflowEngine,
    workflow_id: &str,
    args: &[String],
    run_id: Option<String>,
    cancel: &CancellationToken,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let initial = parse_workflow_args(args);

    // Pick the id up front so the subscription exists before the first event
    let run_id = run_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let request = RunRequest::new(workflow_id)
        .with_initial_data(Value::Object(initial))
        .with_run_id(run_id.clone());

    let mut events = engine.subscribe(&run_id);
    handler.emit(OutputEvent::RunStart {
        workflow: workflow_id.to_string(),
        run_id: run_id.clone(),
    });

    let start = Instant::now();
    // The engine releases the run's channel when it finishes, ending `forward`
    let run = engine.run_with_retry(&request, cancel);
    let forward = async {
        loop {
            match events.recv().await {
                Ok(event) => handler.emit(event.into()),
                Err(RecvError::Lagged(skipped)) => handler.emit(OutputEvent::Debug {
                    message: format!("missed {} status events", skipped),
                }),
                Err(RecvError::Closed) => break,
            }
        }
    };
    let (result, ()) = tokio::join!(run, forward);

    match result {
        Ok(run) => {
            handler.emit(OutputEvent::RunComplete {
                run_id: run.run_id.clone(),
                duration_ms: start.elapsed().as_millis() as u64,
            });
            let output =
                serde_json::to_string_pretty(&run.result).context("serializing run result")?;
            handler.result(true, Some(&output));
            Ok(0)
        }
        Err(e) => {
            handler.emit(OutputEvent::RunError {
                error: format!("Workflow run {} failed: {}", run_id, e),
            });
            handler.result(false, None);
            Ok(if matches!(e, WorkflowError::Cancelled) {
                EXIT_CANCELLED
            } else {
                1
            })
        }
    }
}

/// Parse workflow arguments from CLI into initial run data
///
/// `key=value` pairs become top-level keys. Values that parse as JSON keep
/// their type (`count=3`, `tags=["a"]`); anything else is a string.
fn parse_workflow_args(args: &[String]) -> Map<String, Value> {
    let mut parsed = Map::new();

    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.into()));
            parsed.insert(key.to_string(), value);
        } else {
            // Positional arg - store by index
            parsed.insert(format!("arg{}", parsed.len()), Value::String(arg.clone()));
        }
    }

    parsed
}

/// Validate a workflow without running it
///
/// `workflow` is either a path to a definition file or an id looked up in
/// the configured workflows directory.
pub async fn validate_workflow(
    workflow: &str,
    config: &EngineConfig,
    project_dir: Option<&Path>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let path = Path::new(workflow);
    let loaded = if path.is_file() {
        load_workflow_file(path).map(Some)
    } else {
        let source = FileGraphSource::new(config.workflows_dir(project_dir));
        source.load(workflow).await
    };

    let definition = match loaded {
        Ok(Some(wf)) => wf,
        Ok(None) => {
            handler.emit(OutputEvent::RunError {
                error: format!(
                    "Workflow '{}' not found in {}",
                    workflow,
                    config.workflows_dir(project_dir).display()
                ),
            });
            return Ok(1);
        }
        Err(e) => {
            handler.emit(OutputEvent::RunError {
                error: format!("Failed to load workflow: {}", e),
            });
            return Ok(1);
        }
    };

    let label = if definition.name.trim().is_empty() {
        definition.id.clone()
    } else {
        definition.name.clone()
    };
    let errors = check_definition(&definition, &build_registry(config), &TemplateEngine::new());

    if errors.is_empty() {
        handler.emit(OutputEvent::Info {
            message: format!(
                "✓ Workflow '{}' is valid ({} nodes)",
                label,
                definition.nodes.len()
            ),
        });
        Ok(0)
    } else {
        handler.emit(OutputEvent::Info {
            message: format!("✗ Workflow '{}' has {} error(s):", label, errors.len()),
        });
        for err in &errors {
            handler.emit(OutputEvent::Info {
                message: format!("  - {}", err),
            });
        }
        Ok(1)
    }
}

/// Everything a run would reject before performing any effect
fn check_definition(
    definition: &WorkflowDefinition,
    registry: &ExecutorRegistry,
    templates: &TemplateEngine,
) -> Vec<String> {
    let mut errors = Vec::new();

    if let Err(e) = sort_nodes(&definition.nodes, &definition.connections) {
        errors.push(e.to_string());
    }

    for node in &definition.nodes {
        let Some(executor) = registry.get(&node.node_type) else {
            errors.push(format!(
                "node '{}': unknown node type '{}'",
                node.id, node.node_type
            ));
            continue;
        };

        for field in executor.required_fields() {
            if node.field(field).is_none() {
                errors.push(format!("node '{}': missing required field '{}'", node.id, field));
            }
        }

        for field in executor.template_fields() {
            let sources: Vec<(&str, &str)> = match node.data.get(*field) {
                Some(Value::String(template)) => vec![(*field, template.as_str())],
                Some(Value::Object(map)) => map
                    .iter()
                    .filter_map(|(name, v)| v.as_str().map(|t| (name.as_str(), t)))
                    .collect(),
                _ => Vec::new(),
            };
            for (name, template) in sources {
                if let Err(e) = templates.validate(template) {
                    errors.push(format!("node '{}': {}", node.id, e.in_template(name)));
                }
            }
        }
    }

    debug!(workflow_id = %definition.id, errors = errors.len(), "Checked workflow");
    errors
}

/// List model vendors and their effective settings
pub fn list_providers(config: &EngineConfig, handler: &dyn OutputHandler) -> i32 {
    let factory = HttpProviderFactory::new(config.providers.clone());

    for vendor in Vendor::ALL {
        let settings = factory.config_for(vendor);
        let base_url = settings
            .base_url
            .clone()
            .unwrap_or_else(|| vendor.default_base_url().to_string());
        let model = settings
            .model
            .clone()
            .unwrap_or_else(|| vendor.default_model().to_string());
        handler.emit(OutputEvent::Info {
            message: format!(
                "{} - {} (model {}, timeout {}s)",
                vendor.tag(),
                base_url,
                model,
                settings.timeout
            ),
        });
    }

    let mut unknown: Vec<&str> = config
        .providers
        .keys()
        .map(String::as_str)
        .filter(|name| !Vendor::ALL.iter().any(|v| v.tag() == *name))
        .collect();
    unknown.sort_unstable();
    for name in unknown {
        handler.emit(OutputEvent::Info {
            message: format!("  (ignoring [providers.{}]: no such vendor)", name),
        });
    }

    0
}

/// Encrypt and store a credential
pub fn add_credential(
    config: &EngineConfig,
    project_dir: Option<&Path>,
    credential: NewCredential<'_>,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let key_env = &config.credentials.key_env;
    let cipher = Cipher::from_env(key_env)
        .with_context(|| format!("reading encryption key from ${}", key_env))?;
    let store = open_credential_store(config, project_dir)?;

    store_credential(&store, &cipher, &credential)?;
    handler.emit(OutputEvent::Info {
        message: format!(
            "✓ Stored credential '{}' for owner '{}'",
            credential.id, credential.owner_id
        ),
    });
    Ok(0)
}

/// Arguments for [`add_credential`]
#[derive(Debug, Clone, Copy)]
pub struct NewCredential<'a> {
    pub id: &'a str,
    pub owner_id: &'a str,
    pub name: &'a str,
    pub value: &'a str,
}

fn store_credential(
    store: &SqliteCredentialStore,
    cipher: &Cipher,
    credential: &NewCredential<'_>,
) -> Result<()> {
    if credential.value.trim().is_empty() {
        anyhow::bail!("credential value must not be empty");
    }
    let encrypted = cipher
        .encrypt(credential.value)
        .context("encrypting credential")?;
    store
        .insert(&Credential::new(
            credential.id,
            credential.owner_id,
            credential.name,
            encrypted,
        ))
        .with_context(|| format!("storing credential '{}'", credential.id))
}

/// List an owner's credentials without decrypting them
pub fn list_credentials(
    config: &EngineConfig,
    project_dir: Option<&Path>,
    owner_id: &str,
    handler: &dyn OutputHandler,
) -> Result<i32> {
    let store = open_credential_store(config, project_dir)?;
    describe_credentials(&store, owner_id, handler)?;
    Ok(0)
}

fn describe_credentials(
    store: &SqliteCredentialStore,
    owner_id: &str,
    handler: &dyn OutputHandler,
) -> Result<()> {
    let credentials = store
        .list(owner_id)
        .with_context(|| format!("listing credentials for '{}'", owner_id))?;

    if credentials.is_empty() {
        handler.emit(OutputEvent::Info {
            message: format!("(no credentials for owner '{}')", owner_id),
        });
    }
    for credential in credentials {
        handler.emit(OutputEvent::Info {
            message: format!(
                "{}  {}  (created {})",
                credential.id, credential.name, credential.created_at
            ),
        });
    }
    Ok(())
}
