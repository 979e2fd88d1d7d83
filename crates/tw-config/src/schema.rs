//! Typed views of the `launching` and `studies` blocks.

use crate::validate::ValidationError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_cores() -> u32 {
    2
}

fn default_fl_version() -> String {
    "24.2.0".to_string()
}

fn default_ui_mode() -> String {
    "no_gui".to_string()
}

fn default_dimension() -> u8 {
    3
}

fn default_queue_waiting_time() -> u64 {
    600
}

fn default_server_file() -> String {
    "server-info.txt".to_string()
}

fn default_cov_crit() -> f64 {
    1e-4
}

/// Knobs for the solver-launch collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Launching {
    #[serde(rename = "workingDir", default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Double precision solver.
    #[serde(default = "default_true")]
    pub precision: bool,
    #[serde(rename = "noCore", default = "default_cores")]
    pub no_core: u32,
    #[serde(default = "default_fl_version")]
    pub fl_version: String,
    #[serde(default = "default_ui_mode")]
    pub ui_mode: String,
    #[serde(default = "default_dimension")]
    pub dimension: u8,
    #[serde(default)]
    pub py: bool,
    #[serde(default)]
    pub gpu: bool,
    #[serde(default = "default_true")]
    pub exitatend: bool,
    #[serde(default)]
    pub queue_slurm: bool,
    /// Seconds to wait for a queued solver to come up.
    #[serde(default = "default_queue_waiting_time")]
    pub queue_waiting_time: u64,
    #[serde(default = "default_server_file")]
    pub serverfilename: String,
    #[serde(default)]
    pub ptw_cleanup: bool,
    #[serde(rename = "plotResults", default = "default_true")]
    pub plot_results: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Launching {
    fn default() -> Self {
        Self {
            working_dir: None,
            precision: true,
            no_core: default_cores(),
            fl_version: default_fl_version(),
            ui_mode: default_ui_mode(),
            dimension: default_dimension(),
            py: false,
            gpu: false,
            exitatend: true,
            queue_slurm: false,
            queue_waiting_time: default_queue_waiting_time(),
            serverfilename: default_server_file(),
            ptw_cleanup: false,
            plot_results: true,
            extra: Map::new(),
        }
    }
}

/// Initialization reuse between design points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum InitMethod {
    /// Keep whatever the base case was initialized with.
    #[default]
    #[serde(rename = "base_ini")]
    BaseIni,
    #[serde(rename = "baseDP")]
    BaseDp,
    #[serde(rename = "prevDP")]
    PrevDp,
}

impl InitMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InitMethod::BaseIni => "base_ini",
            InitMethod::BaseDp => "baseDP",
            InitMethod::PrevDp => "prevDP",
        }
    }
}

/// `useScaleFactor` as written by the user: one flag or one per parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScaleFactorSpec {
    Uniform(bool),
    PerParameter(Vec<bool>),
}

impl Default for ScaleFactorSpec {
    fn default() -> Self {
        ScaleFactorSpec::Uniform(false)
    }
}

/// One block of a study `definition`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionBlock {
    pub inputparameters: Vec<String>,
    /// `#parameters` rows by `#design points` columns.
    #[serde(rename = "valueList")]
    pub value_list: Vec<Vec<f64>>,
    #[serde(rename = "useScaleFactor", default)]
    pub use_scale_factor: ScaleFactorSpec,
}

impl DefinitionBlock {
    /// Scale-factor flags aligned to `inputparameters`; a scalar is broadcast.
    pub fn scale_factors(&self) -> Result<Vec<bool>, ValidationError> {
        match &self.use_scale_factor {
            ScaleFactorSpec::Uniform(flag) => Ok(vec![*flag; self.inputparameters.len()]),
            ScaleFactorSpec::PerParameter(flags) if flags.len() == self.inputparameters.len() => {
                Ok(flags.clone())
            }
            ScaleFactorSpec::PerParameter(flags) => Err(ValidationError::InvalidValue {
                field: "useScaleFactor".to_string(),
                value: format!("{flags:?}"),
                reason: format!(
                    "expected {} entries to match inputparameters",
                    self.inputparameters.len()
                ),
            }),
        }
    }

    /// Number of design points this block creates.
    pub fn design_point_count(&self) -> usize {
        self.value_list.first().map(Vec::len).unwrap_or(0)
    }
}

/// A named parametric sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StudyDef {
    #[serde(rename = "refCaseFilename")]
    pub ref_case_filename: String,
    #[serde(rename = "projectFilename", default, skip_serializing_if = "Option::is_none")]
    pub project_filename: Option<String>,
    #[serde(default)]
    pub definition: Vec<DefinitionBlock>,
    #[serde(rename = "initMethod", default)]
    pub init_method: InitMethod,
    #[serde(rename = "updateAllDPs", default = "default_true")]
    pub update_all_dps: bool,
    #[serde(rename = "overwriteExisting", default)]
    pub overwrite_existing: bool,
    #[serde(rename = "runExistingProject", default)]
    pub run_existing_project: bool,
    #[serde(default = "default_true")]
    pub reread_case: bool,
    #[serde(default)]
    pub write_data: bool,
    #[serde(default)]
    pub simulation_report: bool,
    #[serde(default = "default_cov_crit")]
    pub cov_crit: f64,
    #[serde(default)]
    pub cov_list: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_x_axis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_execution: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub functions: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StudyDef {
    pub fn project_filename(&self, study_name: &str) -> String {
        self.project_filename
            .clone()
            .unwrap_or_else(|| format!("{study_name}.flprj"))
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_execution.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn launching_defaults() {
        let launching: Launching = serde_json::from_value(json!({})).unwrap();
        assert_eq!(launching, Launching::default());
        assert!(launching.precision);
        assert_eq!(launching.queue_waiting_time, 600);
    }

    #[test]
    fn launching_keeps_unknown_keys() {
        let launching: Launching =
            serde_json::from_value(json!({"noCore": 8, "mystery": 1})).unwrap();
        assert_eq!(launching.no_core, 8);
        assert!(launching.extra.contains_key("mystery"));
    }

    #[test]
    fn scalar_scale_factor_is_broadcast() {
        let block: DefinitionBlock = serde_json::from_value(json!({
            "inputparameters": ["BC_omega", "BC_OUT_p"],
            "valueList": [[0.9, 1.1], [1.0, 1.0]],
            "useScaleFactor": true
        }))
        .unwrap();
        assert_eq!(block.scale_factors().unwrap(), vec![true, true]);
        assert_eq!(block.design_point_count(), 2);
    }

    #[test]
    fn mismatched_scale_factor_list_is_rejected() {
        let block: DefinitionBlock = serde_json::from_value(json!({
            "inputparameters": ["BC_omega", "BC_OUT_p"],
            "valueList": [[0.9], [1.0]],
            "useScaleFactor": [true]
        }))
        .unwrap();
        assert!(block.scale_factors().is_err());
    }

    #[test]
    fn study_defaults() {
        let study: StudyDef =
            serde_json::from_value(json!({"refCaseFilename": "base_fin"})).unwrap();
        assert_eq!(study.init_method, InitMethod::BaseIni);
        assert!(study.update_all_dps);
        assert!(!study.overwrite_existing);
        assert_eq!(study.project_filename("studyX"), "studyX.flprj");
    }

    #[test]
    fn init_method_names() {
        let m: InitMethod = serde_json::from_value(json!("prevDP")).unwrap();
        assert_eq!(m, InitMethod::PrevDp);
        assert_eq!(m.as_str(), "prevDP");
    }
}
