//! tw-config: the configuration model of the turbo wizard.
//!
//! Loads the user file (JSON or YAML), resolves `refCase` inheritance, inserts
//! defaults, tracks which keys the engine actually read, and selects the named
//! recipe for each stage.

pub mod case;
pub mod dispatch;
pub mod migrate;
pub mod schema;
pub mod tree;
pub mod validate;

pub use case::{Case, REQUIRED_SECTIONS, resolve_case};
pub use dispatch::{FunctionTable, Stage, dispatch};
pub use migrate::migrate_to_latest;
pub use schema::*;
pub use validate::{ValidationError, validate_config, validate_periodic_sides, validate_study};

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Unsupported configuration file extension: {path}")]
    UnsupportedFormat { path: PathBuf },

    #[error("Configuration root must be a mapping")]
    RootNotMapping,

    #[error("Case '{case}' references unknown refCase '{reference}'")]
    MissingRefCase { case: String, reference: String },

    #[error("Case not found: {0}")]
    CaseNotFound(String),

    #[error("Study not found: {0}")]
    StudyNotFound(String),

    #[error("'{field}' must be a mapping")]
    NotAMapping { field: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Name of the folder all wizard artifacts are written to.
pub const OUTPUT_DIR: &str = "PTW_output";

/// Top-level keys the engine reads.
pub const KNOWN_TOP_LEVEL_KEYS: [&str; 6] = [
    "launching",
    "functions",
    "cases",
    "studies",
    "debug_level",
    "ptw_version",
];

/// The loaded configuration tree plus the snapshot taken at load time.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    root: Map<String, Value>,
    snapshot: Map<String, Value>,
    launching: Launching,
}

impl Config {
    /// Build a configuration from an already parsed tree.
    ///
    /// `path` is the location of the file the tree came from; its directory is
    /// the fallback working directory.
    pub fn from_tree(path: &Path, tree: Value) -> ConfigResult<Self> {
        let Value::Object(mut root) = tree else {
            return Err(ConfigError::RootNotMapping);
        };
        for note in migrate_to_latest(&mut root) {
            tracing::warn!(key = "launching", "{note}");
        }
        let snapshot = root.clone();

        let mut launching: Launching = match root.get("launching") {
            Some(value @ Value::Object(_)) => serde_json::from_value(value.clone())?,
            Some(Value::Null) | None => Launching::default(),
            Some(_) => {
                return Err(ConfigError::NotAMapping {
                    field: "launching".to_string(),
                });
            }
        };

        let config_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let working_dir = match launching.working_dir.take() {
            Some(dir) if dir.is_absolute() => dir,
            Some(dir) => config_dir.join(dir),
            None => config_dir,
        };
        launching.working_dir = Some(std::path::absolute(&working_dir).unwrap_or(working_dir));

        root.insert("launching".to_string(), serde_json::to_value(&launching)?);
        root.entry("debug_level".to_string())
            .or_insert_with(|| Value::from(1));
        root.insert(
            "ptw_version".to_string(),
            Value::from(env!("CARGO_PKG_VERSION")),
        );
        for key in ["cases", "studies", "functions"] {
            match root.get(key) {
                Some(Value::Object(_)) => {}
                Some(Value::Null) | None => {
                    root.insert(key.to_string(), Value::Object(Map::new()));
                }
                Some(_) => {
                    return Err(ConfigError::NotAMapping {
                        field: key.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            root,
            snapshot,
            launching,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The enriched tree.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    /// The tree exactly as it was read from disk.
    pub fn snapshot(&self) -> &Map<String, Value> {
        &self.snapshot
    }

    pub fn launching(&self) -> &Launching {
        &self.launching
    }

    pub fn working_dir(&self) -> &Path {
        self.launching
            .working_dir
            .as_deref()
            .unwrap_or_else(|| Path::new("."))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.working_dir().join(OUTPUT_DIR)
    }

    pub fn debug_level(&self) -> u8 {
        self.root
            .get("debug_level")
            .and_then(tree::as_f64)
            .map(|v| v.clamp(0.0, 9.0) as u8)
            .unwrap_or(1)
    }

    pub fn version(&self) -> &str {
        self.root
            .get("ptw_version")
            .and_then(Value::as_str)
            .unwrap_or(env!("CARGO_PKG_VERSION"))
    }

    /// `cases`, `studies` and `functions` are always mappings after loading.
    fn section(&self, key: &str) -> Option<&Map<String, Value>> {
        self.root.get(key).and_then(Value::as_object)
    }

    pub fn cases(&self) -> Option<&Map<String, Value>> {
        self.section("cases")
    }

    pub fn case_names(&self) -> Vec<String> {
        self.cases()
            .map(|cases| cases.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn study_names(&self) -> Vec<String> {
        self.section("studies")
            .map(|studies| studies.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn global_functions(&self) -> FunctionTable {
        self.section("functions").cloned().unwrap_or_default()
    }

    /// Resolve a case against the current (already enriched) sibling cases.
    pub fn resolve_case(&self, name: &str) -> ConfigResult<Case> {
        let cases = self
            .cases()
            .ok_or_else(|| ConfigError::CaseNotFound(name.to_string()))?;
        resolve_case(name, cases)
    }

    /// Write the enriched body of a case back into the tree.
    pub fn store_case(&mut self, case: &Case) {
        if let Some(Value::Object(cases)) = self.root.get_mut("cases") {
            cases.insert(case.name().to_string(), Value::Object(case.body().clone()));
        }
    }

    pub fn study(&self, name: &str) -> ConfigResult<StudyDef> {
        let value = self
            .section("studies")
            .and_then(|studies| studies.get(name))
            .ok_or_else(|| ConfigError::StudyNotFound(name.to_string()))?;
        let study: StudyDef = serde_json::from_value(value.clone())?;
        Ok(study)
    }

    /// Write a study back with its defaults materialized.
    pub fn store_study(&mut self, name: &str, study: &StudyDef) -> ConfigResult<()> {
        let value = serde_json::to_value(study)?;
        if let Some(Value::Object(studies)) = self.root.get_mut("studies") {
            studies.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Top-level keys of the original file that the engine never reads.
    pub fn unused_top_level_keys(&self) -> Vec<String> {
        self.snapshot
            .keys()
            .filter(|k| !KNOWN_TOP_LEVEL_KEYS.contains(&k.as_str()))
            .cloned()
            .collect()
    }

    /// Unknown keys inside the `launching` block.
    pub fn unused_launching_keys(&self) -> Vec<String> {
        self.launching
            .extra
            .keys()
            .map(|k| format!("launching.{k}"))
            .collect()
    }

    pub fn debug_dump_path(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "config".to_string());
        self.output_dir().join(format!("ptw_{stem}.json"))
    }

    /// Persist the enriched tree next to the other outputs.
    pub fn write_debug_dump(&self) -> ConfigResult<PathBuf> {
        let path = self.debug_dump_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.root)?;
        std::fs::write(&path, content)?;
        Ok(path)
    }
}

/// Read a JSON or YAML configuration file, chosen by extension.
pub fn load_config(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let tree: Value = match ext.as_str() {
        "json" => serde_json::from_str(&content)?,
        "yaml" | "yml" => serde_yaml::from_str(&content)?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };
    Config::from_tree(path, tree)
}
