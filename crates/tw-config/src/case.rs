//! A resolved case and the key tracking used for unused-keyword reports.

use crate::tree::{self, as_bool, as_f64, as_text, string_list};
use crate::{ConfigError, ConfigResult};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::BTreeSet;

/// Sub-trees every case must carry; inserted empty when missing.
pub const REQUIRED_SECTIONS: [&str; 6] = [
    "expressions",
    "locations",
    "fluid_properties",
    "setup",
    "solution",
    "results",
];

/// Sections whose individual keys are reported when unused.
const DETAILED_SECTIONS: [&str; 3] = ["setup", "solution", "results"];

/// Resolve `name` against its siblings: deep-copy the `refCase` (if any),
/// overlay the case at the top level, then insert required defaults.
pub fn resolve_case(name: &str, cases: &Map<String, Value>) -> ConfigResult<Case> {
    let own = cases
        .get(name)
        .ok_or_else(|| ConfigError::CaseNotFound(name.to_string()))?
        .as_object()
        .ok_or_else(|| ConfigError::NotAMapping {
            field: format!("cases.{name}"),
        })?;

    let mut body = match own.get("refCase").and_then(as_text) {
        Some(reference) if !reference.is_empty() => {
            let base = cases
                .get(&reference)
                .and_then(Value::as_object)
                .ok_or_else(|| ConfigError::MissingRefCase {
                    case: name.to_string(),
                    reference: reference.clone(),
                })?;
            let mut merged = base.clone();
            tree::overlay_shallow(&mut merged, own);
            merged
        }
        _ => own.clone(),
    };

    for section in REQUIRED_SECTIONS {
        let valid = match body.get(section) {
            Some(Value::Object(_)) => true,
            // A material name from the shipped library.
            Some(Value::String(_)) => section == "fluid_properties",
            _ => false,
        };
        if !valid {
            tracing::warn!(
                key = section,
                case = name,
                "'{section}' missing in case '{name}', inserting an empty mapping"
            );
            body.insert(section.to_string(), Value::Object(Map::new()));
        }
    }
    if !body.contains_key("caseFilename") {
        body.insert("caseFilename".to_string(), Value::from(name));
    }

    Ok(Case::new(name, body))
}

/// The effective description of one CFD run.
#[derive(Debug, Clone)]
pub struct Case {
    name: String,
    body: Map<String, Value>,
    used: RefCell<BTreeSet<String>>,
}

impl Case {
    pub fn new(name: impl Into<String>, body: Map<String, Value>) -> Self {
        let used = BTreeSet::from(["refCase".to_string(), "caseFilename".to_string()]);
        Self {
            name: name.into(),
            body,
            used: RefCell::new(used),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    fn mark(&self, path: impl Into<String>) {
        self.used.borrow_mut().insert(path.into());
    }

    /// Basename for every artifact of this case.
    pub fn filename(&self) -> String {
        self.body
            .get("caseFilename")
            .and_then(as_text)
            .unwrap_or_else(|| self.name.clone())
    }

    pub fn skip_execution(&self) -> bool {
        self.mark("skip_execution");
        self.body
            .get("skip_execution")
            .and_then(as_bool)
            .unwrap_or(false)
    }

    /// Top-level value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.mark(key);
        self.body.get(key)
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(as_text).filter(|s| !s.is_empty())
    }

    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key).map(string_list).unwrap_or_default()
    }

    fn map_of(&self, section: &str) -> Option<&Map<String, Value>> {
        self.body.get(section).and_then(Value::as_object)
    }

    pub fn expressions(&self) -> Map<String, Value> {
        self.mark("expressions");
        self.map_of("expressions").cloned().unwrap_or_default()
    }

    pub fn expression(&self, name: &str) -> Option<String> {
        self.mark("expressions");
        self.map_of("expressions")
            .and_then(|m| m.get(name))
            .and_then(as_text)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn has_expression(&self, name: &str) -> bool {
        self.expression(name).is_some()
    }

    pub fn locations(&self) -> Map<String, Value> {
        self.mark("locations");
        self.map_of("locations").cloned().unwrap_or_default()
    }

    /// Zone names configured for a role; a single string counts as one zone.
    pub fn location_list(&self, role: &str) -> Vec<String> {
        self.mark("locations");
        self.map_of("locations")
            .and_then(|m| m.get(role))
            .map(string_list)
            .unwrap_or_default()
    }

    pub fn has_location(&self, role: &str) -> bool {
        !self.location_list(role).is_empty()
    }

    /// Named entries of a mapping-valued role (interfaces, topologies).
    pub fn location_entries(&self, role: &str) -> Vec<(String, Map<String, Value>)> {
        self.mark("locations");
        match self.map_of("locations").and_then(|m| m.get(role)) {
            Some(Value::Object(entries)) => entries
                .iter()
                .filter_map(|(k, v)| v.as_object().map(|m| (k.clone(), m.clone())))
                .collect(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .filter_map(|(i, v)| {
                    let entry = v.as_object()?;
                    let name = entry
                        .get("name")
                        .and_then(as_text)
                        .unwrap_or_else(|| format!("{role}-{}", i + 1));
                    Some((name, entry.clone()))
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn fluid_properties(&self) -> Value {
        self.mark("fluid_properties");
        self.body
            .get("fluid_properties")
            .cloned()
            .unwrap_or(Value::Object(Map::new()))
    }

    /// Read `section.key` without inserting anything.
    pub fn lookup(&self, section: &str, key: &str) -> Option<&Value> {
        self.mark(format!("{section}.{key}"));
        self.map_of(section).and_then(|m| m.get(key))
    }

    pub fn has(&self, section: &str, key: &str) -> bool {
        matches!(self.lookup(section, key), Some(v) if !v.is_null())
    }

    pub fn list_in(&self, section: &str, key: &str) -> Vec<String> {
        self.lookup(section, key)
            .map(string_list)
            .unwrap_or_default()
    }

    pub fn f64_in(&self, section: &str, key: &str) -> Option<f64> {
        self.lookup(section, key).and_then(as_f64)
    }

    pub fn f64_list_in(&self, section: &str, key: &str) -> Option<Vec<f64>> {
        self.lookup(section, key).and_then(tree::f64_list)
    }

    pub fn text_in(&self, section: &str, key: &str) -> Option<String> {
        self.lookup(section, key).and_then(as_text)
    }

    pub fn map_in(&self, section: &str, key: &str) -> Option<Map<String, Value>> {
        self.lookup(section, key).and_then(Value::as_object).cloned()
    }

    /// Write `section.key`, creating the section if needed.
    pub fn set(&mut self, section: &str, key: &str, value: Value) {
        self.mark(format!("{section}.{key}"));
        let entry = self
            .body
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value);
        }
    }

    fn value_or_insert(&mut self, section: &str, key: &str, default: Value) -> Value {
        let existing = self.lookup(section, key).filter(|v| !v.is_null()).cloned();
        match existing {
            Some(v) => v,
            None => {
                self.set(section, key, default.clone());
                default
            }
        }
    }

    /// Read `section.key`, inserting `default` so the dump shows it.
    pub fn bool_or(&mut self, section: &str, key: &str, default: bool) -> bool {
        let v = self.value_or_insert(section, key, Value::from(default));
        as_bool(&v).unwrap_or_else(|| {
            tracing::warn!(key = %format!("{section}.{key}"), "not a boolean, using {default}");
            default
        })
    }

    pub fn f64_or(&mut self, section: &str, key: &str, default: f64) -> f64 {
        let v = self.value_or_insert(section, key, Value::from(default));
        as_f64(&v).unwrap_or_else(|| {
            tracing::warn!(key = %format!("{section}.{key}"), "not a number, using {default}");
            default
        })
    }

    pub fn usize_or(&mut self, section: &str, key: &str, default: usize) -> usize {
        let v = self.value_or_insert(section, key, Value::from(default));
        as_f64(&v)
            .filter(|x| *x >= 0.0)
            .map(|x| x.round() as usize)
            .unwrap_or_else(|| {
                tracing::warn!(key = %format!("{section}.{key}"), "not a count, using {default}");
                default
            })
    }

    pub fn text_or(&mut self, section: &str, key: &str, default: &str) -> String {
        let v = self.value_or_insert(section, key, Value::from(default));
        as_text(&v).unwrap_or_else(|| default.to_string())
    }

    pub fn f64_list_or(&mut self, section: &str, key: &str, default: &[f64]) -> Vec<f64> {
        let v = self.value_or_insert(section, key, Value::from(default.to_vec()));
        tree::f64_list(&v).unwrap_or_else(|| {
            tracing::warn!(key = %format!("{section}.{key}"), "not a numeric list, using default");
            default.to_vec()
        })
    }

    pub fn list_or(&mut self, section: &str, key: &str, default: &[&str]) -> Vec<String> {
        let fallback: Vec<Value> = default.iter().map(|s| Value::from(*s)).collect();
        let v = self.value_or_insert(section, key, Value::Array(fallback));
        string_list(&v)
    }

    /// The per-case function table, if any.
    pub fn functions(&self) -> Option<&Map<String, Value>> {
        self.mark("functions");
        self.map_of("functions")
    }

    pub fn set_functions(&mut self, table: Map<String, Value>) {
        self.mark("functions");
        self.body.insert("functions".to_string(), Value::Object(table));
    }

    pub fn used_keys(&self) -> BTreeSet<String> {
        self.used.borrow().clone()
    }

    /// Keys present in the case that no stage read.
    pub fn unused_keys(&self) -> Vec<String> {
        let used = self.used.borrow();
        let is_used = |path: &str| {
            used.contains(path)
                || used
                    .iter()
                    .any(|u| u.starts_with(path) && u[path.len()..].starts_with('.'))
        };

        let mut out = Vec::new();
        for (key, value) in &self.body {
            match value {
                Value::Object(section) if DETAILED_SECTIONS.contains(&key.as_str()) => {
                    for sub in section.keys() {
                        let path = format!("{key}.{sub}");
                        if !is_used(&path) {
                            out.push(path);
                        }
                    }
                }
                _ => {
                    if !is_used(key) {
                        out.push(key.clone());
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cases() -> Map<String, Value> {
        json!({
            "baseCase": {
                "caseFilename": "base",
                "setup": {"BC_OUT_reverse": true, "turbulence_model": "geko"},
                "expressions": {"BC_omega": "100 [rad/s]"}
            },
            "derived": {
                "refCase": "baseCase",
                "caseFilename": "derived",
                "setup": {"BC_OUT_reverse": false}
            },
            "orphan": {"refCase": "nowhere"}
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn ref_case_overlay_is_shallow() {
        let case = resolve_case("derived", &cases()).unwrap();
        assert_eq!(case.lookup("setup", "BC_OUT_reverse"), Some(&json!(false)));
        // the nested setup mapping was replaced, not merged
        assert_eq!(case.lookup("setup", "turbulence_model"), None);
        assert_eq!(case.expression("BC_omega").as_deref(), Some("100 [rad/s]"));
        assert_eq!(case.filename(), "derived");
    }

    #[test]
    fn missing_ref_case_is_an_error() {
        let err = resolve_case("orphan", &cases()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingRefCase { .. }));
    }

    #[test]
    fn required_sections_are_inserted() {
        let case = resolve_case("baseCase", &cases()).unwrap();
        for section in REQUIRED_SECTIONS {
            assert!(case.body().contains_key(section), "missing {section}");
        }
    }

    #[test]
    fn defaults_are_written_back() {
        let mut case = resolve_case("baseCase", &cases()).unwrap();
        assert_eq!(case.usize_or("solution", "iter_count", 500), 500);
        assert_eq!(case.body()["solution"]["iter_count"], json!(500));
        assert!(case.bool_or("setup", "BC_OUT_reverse", false));
    }

    #[test]
    fn unused_keys_are_reported() {
        let mut body = resolve_case("baseCase", &cases()).unwrap().body().clone();
        body.insert("typo_key".to_string(), json!(1));
        let case = Case::new("baseCase", body);
        case.lookup("setup", "BC_OUT_reverse");
        case.expressions();
        let unused = case.unused_keys();
        assert!(unused.contains(&"typo_key".to_string()));
        assert!(unused.contains(&"setup.turbulence_model".to_string()));
        assert!(!unused.contains(&"setup.BC_OUT_reverse".to_string()));
        assert!(!unused.contains(&"expressions".to_string()));
    }

    #[test]
    fn interface_entries_from_mapping_and_list() {
        let body = json!({
            "locations": {
                "bz_interfaces_periodic_names": {"per1": {"side1": "a", "side2": "b"}},
                "bz_interfaces_general_names": [{"side1": "c", "side2": "d"}]
            }
        });
        let case = Case::new("c", body.as_object().unwrap().clone());
        let periodic = case.location_entries("bz_interfaces_periodic_names");
        assert_eq!(periodic[0].0, "per1");
        let general = case.location_entries("bz_interfaces_general_names");
        assert_eq!(general[0].0, "bz_interfaces_general_names-1");
    }
}
