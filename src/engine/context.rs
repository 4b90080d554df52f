//! Data context threaded through a workflow run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Accumulating variable map for one run
///
/// Values are only ever added or shadowed. Merging returns a new context, so
/// a failing node can never leave a half-updated map behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    vars: Map<String, Value>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from trigger-supplied data
    ///
    /// `None` and `null` give an empty context; anything other than a JSON
    /// object is rejected.
    pub fn from_initial(data: Option<Value>) -> Result<Self, Value> {
        match data {
            None | Some(Value::Null) => Ok(Self::new()),
            Some(Value::Object(vars)) => Ok(Self { vars }),
            Some(other) => Err(other),
        }
    }

    /// Return a copy with `key` set to `value`
    pub fn merged(&self, key: impl Into<String>, value: Value) -> Self {
        let mut vars = self.vars.clone();
        vars.insert(key.into(), value);
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.vars
    }
}

impl From<Map<String, Value>> for ExecutionContext {
    fn from(vars: Map<String, Value>) -> Self {
        Self { vars }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_initial() {
        assert!(ExecutionContext::from_initial(None).unwrap().is_empty());
        assert!(ExecutionContext::from_initial(Some(Value::Null)).unwrap().is_empty());

        let ctx = ExecutionContext::from_initial(Some(json!({"name": "Sam"}))).unwrap();
        assert_eq!(ctx.get("name"), Some(&json!("Sam")));

        let rejected = ExecutionContext::from_initial(Some(json!([1, 2]))).unwrap_err();
        assert_eq!(rejected, json!([1, 2]));
    }

    #[test]
    fn test_merged_leaves_original_untouched() {
        let base = ExecutionContext::from_initial(Some(json!({"a": 1}))).unwrap();
        let next = base.merged("b", json!(2));

        assert!(!base.contains("b"));
        assert_eq!(next.len(), 2);
        assert_eq!(next.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_later_write_shadows_earlier() {
        let ctx = ExecutionContext::new()
            .merged("x", json!("first"))
            .merged("y", json!(true))
            .merged("x", json!({"text": "second"}));

        assert_eq!(ctx.get("x"), Some(&json!({"text": "second"})));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let ctx = ExecutionContext::new().merged("k", json!("v"));
        assert_eq!(serde_json::to_value(&ctx).unwrap(), json!({"k": "v"}));
    }
}
