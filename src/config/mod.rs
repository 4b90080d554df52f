//! Configuration types and loading for nodeflow

mod loader;
mod provider;
mod workflow;

pub use loader::{CredentialsConfig, Defaults, EngineConfig};
pub use provider::ProviderConfig;
pub use workflow::{Connection, Node, WorkflowDefinition};
