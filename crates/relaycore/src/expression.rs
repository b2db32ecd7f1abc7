//! `{{ $json.path }}` template resolution for node parameters.
//!
//! A string that consists of exactly one expression resolves to the
//! referenced value with its JSON type intact. Any other string has each
//! expression replaced by the text form of its value. Unknown paths never
//! fail: they resolve to `null` (whole-string case) or to nothing
//! (embedded case).

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*\$json((?:\.[^\s.{}]+)*)\s*\}\}").expect("expression pattern is valid")
    })
}

/// Resolve every template found in `value`, descending into arrays and objects
pub fn resolve_value(value: &Value, item: &Value) -> Value {
    match value {
        Value::String(template) => resolve_str(template, item),
        Value::Array(values) => Value::Array(values.iter().map(|v| resolve_value(v, item)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| (key.clone(), resolve_value(v, item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve a single template string against an item payload
pub fn resolve_str(template: &str, item: &Value) -> Value {
    let pattern = expression_pattern();

    if let Some(caps) = pattern.captures(template) {
        let whole = caps.get(0).map(|m| m.start() == 0 && m.end() == template.len());
        if whole == Some(true) {
            let path = caps.get(1).map_or("", |m| m.as_str());
            return lookup_path(item, path).cloned().unwrap_or(Value::Null);
        }
    } else {
        return Value::String(template.to_string());
    }

    let replaced = pattern.replace_all(template, |caps: &regex::Captures<'_>| {
        let path = caps.get(1).map_or("", |m| m.as_str());
        display(lookup_path(item, path))
    });
    Value::String(replaced.into_owned())
}

/// Walk a dotted path (`.a.b.0`) through nested objects and arrays.
/// An empty path refers to the whole payload.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(root, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(values) => segment.parse::<usize>().ok().and_then(|i| values.get(i)),
            _ => None,
        })
}

/// Whether a string contains at least one template
pub fn is_expression(template: &str) -> bool {
    expression_pattern().is_match(template)
}

fn display(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
