//! Template engine for rendering prompts and request parameters

use super::errors::TemplateError;
use super::filters;
use crate::engine::ExecutionContext;
use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;
use std::sync::LazyLock;

/// Instruction budget for a single render
const RENDER_FUEL: u64 = 50_000;

/// `{{json some.value}}` helper-call form
static HELPER_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*json\s+([^}]+?)\s*\}\}").expect("helper call pattern is valid")
});

/// Template rendering engine
///
/// Wraps minijinja with the `json` helper and chainable undefined handling:
/// a missing variable, or a lookup through one, renders as an empty string.
/// Only `{{ }}` expressions are accepted; `{% %}` statement blocks (loops,
/// `set`, macros) are syntax errors. Each render runs on a fuel budget.
/// Templates get no access to the filesystem or environment.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine {
    /// Create a new template engine with default configuration
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_fuel(Some(RENDER_FUEL));
        filters::register_filters(&mut env);
        Self { env }
    }

    /// Render a template string against the execution context
    ///
    /// # Example
    ///
    /// ```ignore
    /// let engine = TemplateEngine::new();
    /// let ctx = ExecutionContext::new().merged("name", json!("Sam"));
    ///
    /// assert_eq!(engine.render("Hello {{name}}", &ctx)?, "Hello Sam");
    /// ```
    pub fn render(&self, template: &str, ctx: &ExecutionContext) -> Result<String, TemplateError> {
        reject_statements(template)?;
        let source = expand_helper_calls(template);
        let rendered = self.env.render_str(&source, ctx.as_map())?;
        Ok(rendered)
    }

    /// Render a named configuration field, tagging errors with the field name
    pub fn render_field(
        &self,
        field: &str,
        template: &str,
        ctx: &ExecutionContext,
    ) -> Result<String, TemplateError> {
        self.render(template, ctx).map_err(|e| e.in_template(field))
    }

    /// Check if a template is syntactically valid
    pub fn validate(&self, template: &str) -> Result<(), TemplateError> {
        reject_statements(template)?;
        let mut env = self.env.clone();
        env.add_template_owned("__validate__", expand_helper_calls(template))?;
        Ok(())
    }
}

/// Fail on the first `{%` block opener
fn reject_statements(template: &str) -> Result<(), TemplateError> {
    match template.find("{%") {
        Some(offset) => {
            let line = template[..offset].matches('\n').count() + 1;
            Err(TemplateError::syntax("statement blocks are not supported", line))
        }
        None => Ok(()),
    }
}

/// Rewrite `{{json x}}` into `{{ json(x) }}`
fn expand_helper_calls(template: &str) -> String {
    HELPER_CALL.replace_all(template, "{{ json($1) }}").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(value: serde_json::Value) -> ExecutionContext {
        ExecutionContext::from_initial(Some(value)).unwrap()
    }

    #[test]
    fn test_simple_render() {
        let engine = TemplateEngine::new();
        let result = engine.render("Hello, world!", &ExecutionContext::new()).unwrap();
        assert_eq!(result, "Hello, world!");
    }

    #[test]
    fn test_variable_substitution() {
        let engine = TemplateEngine::new();
        let result = engine.render("Hello {{name}}", &ctx(json!({"name": "Sam"}))).unwrap();
        assert_eq!(result, "Hello Sam");
    }

    #[test]
    fn test_nested_access() {
        let engine = TemplateEngine::new();
        let c = ctx(json!({"summary": {"text": "short"}}));
        assert_eq!(engine.render("{{ summary.text }}", &c).unwrap(), "short");
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let engine = TemplateEngine::new();
        let c = ExecutionContext::new();
        assert_eq!(engine.render("Hi {{ nobody }}!", &c).unwrap(), "Hi !");
        assert_eq!(engine.render("[{{ a.b.c }}]", &c).unwrap(), "[]");
    }

    #[test]
    fn test_json_helper_forms() {
        let engine = TemplateEngine::new();
        let c = ctx(json!({"data": {"k": [1, 2]}}));
        let expected = "{\n  \"k\": [\n    1,\n    2\n  ]\n}";

        assert_eq!(engine.render("{{json data}}", &c).unwrap(), expected);
        assert_eq!(engine.render("{{ json data }}", &c).unwrap(), expected);
        assert_eq!(engine.render("{{ json(data) }}", &c).unwrap(), expected);
        assert_eq!(engine.render("{{ data | json }}", &c).unwrap(), expected);
    }

    #[test]
    fn test_json_helper_on_nested_value() {
        let engine = TemplateEngine::new();
        let c = ctx(json!({"resp": {"httpResponse": {"status": 200}}}));
        assert_eq!(
            engine.render("{{json resp.httpResponse}}", &c).unwrap(),
            "{\n  \"status\": 200\n}"
        );
    }

    #[test]
    fn test_variable_named_like_helper_prefix() {
        let engine = TemplateEngine::new();
        let c = ctx(json!({"jsonish": "yes"}));
        assert_eq!(engine.render("{{ jsonish }}", &c).unwrap(), "yes");
    }

    #[test]
    fn test_syntax_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render("{{ invalid syntax {{", &ExecutionContext::new())
            .unwrap_err();
        assert!(matches!(err, TemplateError::SyntaxError { .. }));
    }

    #[test]
    fn test_render_field_tags_error() {
        let engine = TemplateEngine::new();
        let err = engine
            .render_field("userPrompt", "{% if %}", &ExecutionContext::new())
            .unwrap_err();
        assert_eq!(err.location().template_name.as_deref(), Some("userPrompt"));
    }

    #[test]
    fn test_statement_blocks_rejected() {
        let engine = TemplateEngine::new();
        let c = ctx(json!({"items": [1, 2, 3]}));

        for template in [
            "{% for i in items %}{{ i }}{% endfor %}",
            "{% for i in range(100000) %}x{% endfor %}",
            "{% set greeting = 'hi' %}{{ greeting }}",
            "{% macro m() %}x{% endmacro %}{{ m() }}",
            "{%- if items -%}yes{%- endif -%}",
        ] {
            let err = engine.render(template, &c).unwrap_err();
            assert!(matches!(err, TemplateError::SyntaxError { .. }), "{template}: {err:?}");
            assert!(engine.validate(template).is_err(), "{template}");
        }
    }

    #[test]
    fn test_statement_error_reports_line() {
        let engine = TemplateEngine::new();
        let err = engine
            .render("Hello {{ name }}\n\n{% set x = 1 %}", &ExecutionContext::new())
            .unwrap_err();
        assert_eq!(err.location().line, 3);
    }

    #[test]
    fn test_validate() {
        let engine = TemplateEngine::new();
        assert!(engine.validate("Hello {{ name }}").is_ok());
        assert!(engine.validate("{{json name}}").is_ok());
        assert!(engine.validate("Hello {{ name }").is_err());
    }

    #[test]
    fn test_no_environment_access() {
        let engine = TemplateEngine::new();
        let out = engine.render("[{{ env.HOME }}]", &ExecutionContext::new()).unwrap();
        assert_eq!(out, "[]");
    }
}
