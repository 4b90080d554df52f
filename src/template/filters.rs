//! Template helpers

use minijinja::value::Value;
use minijinja::{Error, ErrorKind};

/// Register the helpers available to template authors
///
/// `json` is exposed both as a filter (`{{ x | json }}`) and as a function
/// (`{{ json(x) }}`).
pub fn register_filters(env: &mut minijinja::Environment) {
    env.add_filter("json", filter_json);
    env.add_function("json", filter_json);
}

/// Serialize a value to pretty-printed JSON
///
/// Undefined values render as an empty string, like any other missing
/// variable.
fn filter_json(value: Value) -> Result<Value, Error> {
    if value.is_undefined() {
        return Ok(Value::from(""));
    }

    let json = serde_json::to_string_pretty(&value).map_err(|e| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("JSON serialization failed: {}", e),
        )
    })?;
    Ok(Value::from(json))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        register_filters(&mut env);
        env
    }

    #[test]
    fn test_json_filter_pretty_prints() {
        let out = env()
            .render_str("{{ v | json }}", minijinja::context! { v => vec![1, 2] })
            .unwrap();
        assert_eq!(out, "[\n  1,\n  2\n]");
    }

    #[test]
    fn test_json_function() {
        let out = env()
            .render_str("{{ json(v) }}", minijinja::context! { v => "quote\"d" })
            .unwrap();
        assert_eq!(out, "\"quote\\\"d\"");
    }

    #[test]
    fn test_json_of_undefined_is_empty() {
        let out = env().render_str("[{{ json(missing) }}]", ()).unwrap();
        assert_eq!(out, "[]");
    }
}
