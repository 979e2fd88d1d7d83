//! Lenient accessors over the untyped configuration tree.
//!
//! User files mix `1`, `1.0`, `"1"` and `true` freely, so every typed read goes
//! through these helpers.

use serde_json::{Map, Value};

pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

pub fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Render a scalar as the text the solver expects.
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A single name or a list of names.
pub fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(as_text).collect(),
        Value::Null => Vec::new(),
        other => as_text(other).into_iter().collect(),
    }
}

pub fn f64_list(value: &Value) -> Option<Vec<f64>> {
    match value {
        Value::Array(items) => items.iter().map(as_f64).collect(),
        _ => None,
    }
}

/// Overlay `over` onto `base` at the top level only: any key present in
/// `over` replaces the value in `base` wholesale, nested mappings included.
pub fn overlay_shallow(base: &mut Map<String, Value>, over: &Map<String, Value>) {
    for (key, value) in over {
        base.insert(key.clone(), value.clone());
    }
}

/// Collect `prefix.key` paths down to `depth` levels.
pub fn key_paths(map: &Map<String, Value>, prefix: &str, depth: usize, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(child) if depth > 1 && !child.is_empty() => {
                key_paths(child, &path, depth - 1, out)
            }
            _ => out.push(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lenient_scalars() {
        assert_eq!(as_f64(&json!("1e-4")), Some(1e-4));
        assert_eq!(as_f64(&json!(5)), Some(5.0));
        assert_eq!(as_bool(&json!("True")), Some(true));
        assert_eq!(as_bool(&json!(0)), Some(false));
        assert_eq!(as_bool(&json!([1])), None);
    }

    #[test]
    fn single_name_becomes_list() {
        assert_eq!(string_list(&json!("inflow")), vec!["inflow"]);
        assert_eq!(string_list(&json!(["a", "b"])), vec!["a", "b"]);
        assert!(string_list(&Value::Null).is_empty());
    }

    #[test]
    fn overlay_replaces_nested_maps() {
        let mut base = json!({"setup": {"a": 1, "b": 2}, "x": 1});
        let over = json!({"setup": {"a": 5}});
        overlay_shallow(
            base.as_object_mut().unwrap(),
            over.as_object().unwrap(),
        );
        assert_eq!(base, json!({"setup": {"a": 5}, "x": 1}));
    }

    #[test]
    fn key_paths_respect_depth() {
        let tree = json!({"setup": {"a": 1, "b": {"c": 2}}, "name": "x"});
        let mut out = Vec::new();
        key_paths(tree.as_object().unwrap(), "", 2, &mut out);
        assert_eq!(out, vec!["setup.a", "setup.b", "name"]);
    }
}
