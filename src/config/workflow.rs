//! Workflow definition types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// A single configured unit of work in a workflow graph
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Node {
    /// Node id (unique within workflow)
    pub id: String,

    /// Tag selecting the executor
    #[serde(rename = "type")]
    pub node_type: String,

    /// Type-specific configuration (prompt text, variable name, ...)
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            data: Map::new(),
        }
    }

    /// Set a configuration field
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Get a configuration field as a non-blank string
    ///
    /// Absent, null and whitespace-only values all count as missing.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// Declared dependency from one node to another
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Connection {
    #[serde(alias = "fromNodeId")]
    pub from: String,

    #[serde(alias = "toNodeId")]
    pub to: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Workflow definition as served by a graph source
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Workflow id
    pub id: String,

    /// Human-readable name
    #[serde(default)]
    pub name: String,

    /// Owner of the workflow; scopes credential lookups
    pub owner_id: String,

    /// Nodes in declaration order
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Edges between nodes
    #[serde(default)]
    pub connections: Vec<Connection>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_connection(mut self, from: &str, to: &str) -> Self {
        self.connections.push(Connection::new(from, to));
        self
    }

    /// Structural checks that don't need the executor registry
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push("workflow id must not be empty".to_string());
        }
        if self.owner_id.trim().is_empty() {
            errors.push("ownerId must not be empty".to_string());
        }

        let mut ids = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                errors.push("node id must not be empty".to_string());
            } else if !ids.insert(node.id.as_str()) {
                errors.push(format!("duplicate node id '{}'", node.id));
            }
        }

        for conn in &self.connections {
            for endpoint in [&conn.from, &conn.to] {
                if !ids.contains(endpoint.as_str()) {
                    errors.push(format!(
                        "connection {} -> {} references unknown node '{}'",
                        conn.from, conn.to, endpoint
                    ));
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_toml() {
        let toml = r#"
            id = "wf-1"
            name = "Summarize"
            ownerId = "user-1"

            [[nodes]]
            id = "a"
            type = "manual_trigger"

            [[nodes]]
            id = "b"
            type = "openai"
            [nodes.data]
            variableName = "summary"
            userPrompt = "Hello {{name}}"

            [[connections]]
            from = "a"
            to = "b"
        "#;
        let wf: WorkflowDefinition = toml::from_str(toml).unwrap();
        assert_eq!(wf.owner_id, "user-1");
        assert_eq!(wf.nodes.len(), 2);
        assert_eq!(wf.nodes[1].field("variableName"), Some("summary"));
        assert!(wf.nodes[0].data.is_empty());
        assert_eq!(wf.connections[0], Connection::new("a", "b"));
        assert!(wf.validate().is_ok());
    }

    #[test]
    fn test_deserialize_json_aliases() {
        let json = r#"{
            "id": "wf-2",
            "ownerId": "user-1",
            "nodes": [{"id": "a", "type": "initial"}, {"id": "b", "type": "initial"}],
            "connections": [{"fromNodeId": "a", "toNodeId": "b"}]
        }"#;
        let wf: WorkflowDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(wf.connections[0].from, "a");
        assert_eq!(wf.connections[0].to, "b");
    }

    #[test]
    fn test_field_treats_blank_as_missing() {
        let node = Node::new("n", "openai")
            .with("variableName", "   ")
            .with("userPrompt", "hi")
            .with("model", Value::Null);

        assert_eq!(node.field("variableName"), None);
        assert_eq!(node.field("model"), None);
        assert_eq!(node.field("credentialId"), None);
        assert_eq!(node.field("userPrompt"), Some("hi"));
    }

    #[test]
    fn test_validate_reports_all_problems() {
        let wf = WorkflowDefinition::new("wf", "")
            .with_node(Node::new("a", "initial"))
            .with_node(Node::new("a", "initial"))
            .with_connection("a", "ghost");

        let errors = wf.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("ownerId")));
        assert!(errors.iter().any(|e| e.contains("duplicate node id 'a'")));
        assert!(errors.iter().any(|e| e.contains("'ghost'")));
    }
}
