//! Template rendering.
//!
//! Templates reference resolved properties as `{{ .name }}`. Rendering a config
//! template JSON-escapes string values, since payloads are JSON documents and the
//! placeholder usually sits inside a quoted string. Compound parameters use the
//! same syntax through [`format`] but substitute raw text.

use monaco_core::{Properties, Value};
use regex::Regex;
use std::sync::LazyLock;

use crate::error::{ConfigError, ConfigResult};

// Matches the inside of a `{{ ... }}` action that names a property
static PROPERTY_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\.([a-zA-Z_][a-zA-Z0-9_]*)\s*$").unwrap());

/// Render a payload template with the given properties.
pub fn render(content: &str, properties: &Properties) -> ConfigResult<String> {
    substitute(content, properties, escape_json)
}

/// Combine properties through a format string without escaping.
pub fn format(format: &str, properties: &Properties) -> ConfigResult<String> {
    substitute(format, properties, |v| v.to_string())
}

fn substitute(
    content: &str,
    properties: &Properties,
    text: impl Fn(&Value) -> String,
) -> ConfigResult<String> {
    let mut out = String::with_capacity(content.len());
    for_each_action(content, |literal, name| {
        out.push_str(literal);
        if !name.is_empty() {
            let value = properties
                .get(name)
                .ok_or_else(|| ConfigError::MissingProperty(name.to_string()))?;
            out.push_str(&text(value));
        }
        Ok(())
    })?;
    Ok(out)
}

/// Walk the template, calling `f` with each literal chunk and the property named by
/// the action that follows it. The trailing chunk is passed with an empty name.
fn for_each_action<'a>(
    content: &'a str,
    mut f: impl FnMut(&'a str, &'a str) -> ConfigResult<()>,
) -> ConfigResult<()> {
    let mut rest = content;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| {
            ConfigError::MalformedTemplate(format!("unclosed action at {:?}", truncate(after)))
        })?;
        let action = &after[..end];
        let name = PROPERTY_ACTION
            .captures(action)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                ConfigError::MalformedTemplate(format!("unsupported action {{{{{action}}}}}"))
            })?;
        f(&rest[..start], name)?;
        rest = &after[end + 2..];
    }
    f(rest, "")
}

fn escape_json(value: &Value) -> String {
    match value {
        Value::String(s) => {
            let quoted = serde_json::Value::String(s.clone()).to_string();
            quoted[1..quoted.len() - 1].to_string()
        }
        other => other.to_string(),
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(20) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, Value)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_basic() {
        let p = props(&[("name", Value::from("Team A")), ("enabled", Value::from(true))]);
        let out = render(r#"{"name": "{{ .name }}", "enabled": {{.enabled}}}"#, &p).unwrap();
        assert_eq!(out, r#"{"name": "Team A", "enabled": true}"#);
    }

    #[test]
    fn test_render_escapes_strings() {
        let p = props(&[("name", Value::from("say \"hi\"\n"))]);
        let out = render(r#"{"name": "{{ .name }}"}"#, &p).unwrap();
        assert_eq!(out, r#"{"name": "say \"hi\"\n"}"#);
    }

    #[test]
    fn test_format_does_not_escape() {
        let p = props(&[("a", Value::from("x\"y"))]);
        assert_eq!(format("<{{ .a }}>", &p).unwrap(), "<x\"y>");
    }

    #[test]
    fn test_render_list_inside_array() {
        let p = props(&[("tags", Value::from(r#""a", "b""#))]);
        assert_eq!(format("[{{ .tags }}]", &p).unwrap(), r#"["a", "b"]"#);
    }

    #[test]
    fn test_missing_property() {
        let err = render("{{ .missing }}", &Properties::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty(name) if name == "missing"));
    }

    #[test]
    fn test_malformed_templates() {
        let p = Properties::new();
        assert!(matches!(
            render("{\"a\": {{ .a }", &p),
            Err(ConfigError::MalformedTemplate(_))
        ));
        assert!(matches!(
            render("{{ range .items }}", &p),
            Err(ConfigError::MalformedTemplate(_))
        ));
    }

    #[test]
    fn test_no_placeholders_is_identity() {
        let content = r#"{"nested": {"a": 1}}"#;
        assert_eq!(render(content, &Properties::new()).unwrap(), content);
    }
}
