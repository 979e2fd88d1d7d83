//! Legacy key migration.
//!
//! Older configuration files spell a few launching knobs differently. Each
//! migration rewrites one spelling into the current one and reports what it did.

use serde_json::{Map, Value};

type Migration = fn(&mut Map<String, Value>) -> Option<String>;

const MIGRATIONS: [Migration; 4] = [
    migrate_show_gui,
    migrate_version_to_dimension,
    migrate_working_dir_spelling,
    migrate_debug_level_spelling,
];

/// Apply every migration; returns one note per rewritten key.
pub fn migrate_to_latest(root: &mut Map<String, Value>) -> Vec<String> {
    MIGRATIONS.iter().filter_map(|m| m(root)).collect()
}

fn launching_mut(root: &mut Map<String, Value>) -> Option<&mut Map<String, Value>> {
    root.get_mut("launching").and_then(Value::as_object_mut)
}

fn migrate_show_gui(root: &mut Map<String, Value>) -> Option<String> {
    let launching = launching_mut(root)?;
    let show = launching.remove("show_gui")?;
    if launching.contains_key("ui_mode") {
        return Some("'show_gui' ignored because 'ui_mode' is set".to_string());
    }
    let mode = if crate::tree::as_bool(&show).unwrap_or(false) {
        "gui"
    } else {
        "no_gui"
    };
    launching.insert("ui_mode".to_string(), Value::from(mode));
    Some(format!("'show_gui' is deprecated, using ui_mode = '{mode}'"))
}

fn migrate_version_to_dimension(root: &mut Map<String, Value>) -> Option<String> {
    let launching = launching_mut(root)?;
    let version = launching.remove("version")?;
    if launching.contains_key("dimension") {
        return Some("'version' ignored because 'dimension' is set".to_string());
    }
    let text = crate::tree::as_text(&version).unwrap_or_default();
    let dimension = if text.trim_start().starts_with('2') { 2 } else { 3 };
    launching.insert("dimension".to_string(), Value::from(dimension));
    Some(format!(
        "'version' is deprecated, using dimension = {dimension}"
    ))
}

fn migrate_working_dir_spelling(root: &mut Map<String, Value>) -> Option<String> {
    let launching = launching_mut(root)?;
    let dir = launching.remove("workingdir")?;
    launching.entry("workingDir".to_string()).or_insert(dir);
    Some("'workingdir' renamed to 'workingDir'".to_string())
}

fn migrate_debug_level_spelling(root: &mut Map<String, Value>) -> Option<String> {
    let level = root.remove("debuglevel")?;
    root.entry("debug_level".to_string()).or_insert(level);
    Some("'debuglevel' renamed to 'debug_level'".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn current_file_is_untouched() {
        let mut root = json!({"launching": {"ui_mode": "gui", "dimension": 3}})
            .as_object()
            .unwrap()
            .clone();
        let before = root.clone();
        assert!(migrate_to_latest(&mut root).is_empty());
        assert_eq!(root, before);
    }

    #[test]
    fn legacy_launching_keys_are_rewritten() {
        let mut root = json!({
            "launching": {"show_gui": true, "version": "2ddp", "workingdir": "/tmp/run"},
            "debuglevel": 2
        })
        .as_object()
        .unwrap()
        .clone();
        let notes = migrate_to_latest(&mut root);
        assert_eq!(notes.len(), 4);
        let launching = root["launching"].as_object().unwrap();
        assert_eq!(launching["ui_mode"], json!("gui"));
        assert_eq!(launching["dimension"], json!(2));
        assert_eq!(launching["workingDir"], json!("/tmp/run"));
        assert_eq!(root["debug_level"], json!(2));
    }
}
