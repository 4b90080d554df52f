//! Template error types with source locations

use std::fmt;
use thiserror::Error;

/// Location in a template where an error occurred
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub template_name: Option<String>,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref name) = self.template_name {
            write!(f, "{}:{}", name, self.line)
        } else {
            write!(f, "line {}", self.line)
        }
    }
}

/// Template errors
///
/// Both variants are authoring mistakes; retrying a run can't fix them.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    /// Malformed template source
    #[error("syntax error at {location}: {message}")]
    SyntaxError {
        message: String,
        location: SourceLocation,
    },

    /// Template parsed but failed while rendering (bad filter arguments etc.)
    #[error("render error at {location}: {message}")]
    RenderError {
        message: String,
        location: SourceLocation,
    },
}

impl TemplateError {
    /// Create a syntax error
    pub fn syntax(message: impl Into<String>, line: usize) -> Self {
        Self::SyntaxError {
            message: message.into(),
            location: SourceLocation {
                line,
                template_name: None,
            },
        }
    }

    /// Create a render error
    pub fn render(message: impl Into<String>, line: usize) -> Self {
        Self::RenderError {
            message: message.into(),
            location: SourceLocation {
                line,
                template_name: None,
            },
        }
    }

    /// Attach the name of the field the template came from
    pub fn in_template(mut self, name: impl Into<String>) -> Self {
        let location = match &mut self {
            Self::SyntaxError { location, .. } | Self::RenderError { location, .. } => location,
        };
        location.template_name = Some(name.into());
        self
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::SyntaxError { location, .. } | Self::RenderError { location, .. } => location,
        }
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        let line = err.line().unwrap_or(0);
        let message = match err.detail() {
            Some(detail) => format!("{}: {}", err.kind(), detail),
            None => err.kind().to_string(),
        };
        match err.kind() {
            minijinja::ErrorKind::SyntaxError => Self::syntax(message, line),
            _ => Self::render(message, line),
        }
    }
}
