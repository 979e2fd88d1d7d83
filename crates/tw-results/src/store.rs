//! Per-case run manifests under the output folder.

use crate::{ResultsError, ResultsResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseManifest {
    pub case: String,
    pub case_hash: String,
    pub status: CaseStatus,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub solver_version: String,
    pub wizard_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub iterations: usize,
}

impl CaseManifest {
    pub fn new(case: &str, case_hash: String, status: CaseStatus, solver_version: &str) -> Self {
        Self {
            case: case.to_string(),
            case_hash,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
            solver_version: solver_version.to_string(),
            wizard_version: env!("CARGO_PKG_VERSION").to_string(),
            message: None,
            iterations: 0,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Manifests live at `<root>/case_<name>/manifest.json`.
#[derive(Clone)]
pub struct RunStore {
    root_dir: PathBuf,
}

impl RunStore {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    pub fn case_dir(&self, case: &str) -> PathBuf {
        self.root_dir.join(format!("case_{case}"))
    }

    pub fn has_case(&self, case: &str) -> bool {
        self.case_dir(case).join("manifest.json").exists()
    }

    pub fn save(&self, manifest: &CaseManifest) -> ResultsResult<PathBuf> {
        let case_dir = self.case_dir(&manifest.case);
        fs::create_dir_all(&case_dir)?;
        let path = case_dir.join("manifest.json");
        fs::write(&path, serde_json::to_string_pretty(manifest)?)?;
        Ok(path)
    }

    pub fn load(&self, case: &str) -> ResultsResult<CaseManifest> {
        let path = self.case_dir(case).join("manifest.json");
        if !path.exists() {
            return Err(ResultsError::ManifestNotFound {
                case: case.to_string(),
            });
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// All manifests, sorted by case name.
    pub fn list(&self) -> ResultsResult<Vec<CaseManifest>> {
        let mut manifests = Vec::new();
        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(case) = name.strip_prefix("case_")
                && entry.path().is_dir()
                && let Ok(manifest) = self.load(case)
            {
                manifests.push(manifest);
            }
        }
        manifests.sort_by(|a, b| a.case.cmp(&b.case));
        Ok(manifests)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("PTW_output")).unwrap();
        let manifest = CaseManifest::new("caseA", "abc".into(), CaseStatus::Skipped, "24.2.0")
            .with_message("skip=true");
        store.save(&manifest).unwrap();

        assert!(store.has_case("caseA"));
        assert_eq!(store.load("caseA").unwrap(), manifest);
        assert_eq!(store.list().unwrap().len(), 1);
        assert!(matches!(
            store.load("caseB"),
            Err(ResultsError::ManifestNotFound { .. })
        ));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&CaseStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }
}
