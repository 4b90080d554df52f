//! Template rendering for node configuration fields
//!
//! Node configuration strings (prompts, endpoints, bodies) are templates
//! evaluated against the current execution context.
//!
//! # Features
//!
//! - Variable substitution: `{{ name }}`, `{{ summary.text }}`
//! - JSON helper: `{{json data}}`, `{{ json(data) }}` or `{{ data | json }}`
//! - Missing variables render as an empty string
//! - Expressions only: `{% %}` statement blocks are rejected
//!
//! # Example
//!
//! ```ignore
//! use nodeflow::template::TemplateEngine;
//!
//! let engine = TemplateEngine::new();
//! let prompt = engine.render("Summarize: {{ article.text }}", &ctx)?;
//! ```

mod engine;
mod errors;
mod filters;

pub use engine::TemplateEngine;
pub use errors::{SourceLocation, TemplateError};
