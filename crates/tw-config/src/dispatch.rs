//! Function dispatch: which named recipe runs for each stage.

use crate::case::Case;
use crate::tree::as_text;
use serde_json::{Map, Value};

/// Stage name to recipe name.
pub type FunctionTable = Map<String, Value>;

/// Stages with selectable recipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Setup,
    Numerics,
    Initialization,
    PrePostproc,
    Postproc,
    ParametricStudy,
    ParametricStudyPost,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Setup,
        Stage::Numerics,
        Stage::Initialization,
        Stage::PrePostproc,
        Stage::Postproc,
        Stage::ParametricStudy,
        Stage::ParametricStudyPost,
    ];

    /// Key of this stage in a function table.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::Setup => "setup",
            Stage::Numerics => "numerics",
            Stage::Initialization => "initialization",
            Stage::PrePostproc => "prepostproc",
            Stage::Postproc => "postproc",
            Stage::ParametricStudy => "parametricstudy",
            Stage::ParametricStudyPost => "parametricstudy_post",
        }
    }

    /// Recipe used when neither table names one.
    pub fn default_recipe(&self, gpu: bool) -> &'static str {
        match self {
            Stage::Setup => "setup_compressible_01",
            Stage::Numerics if gpu => "numerics_defaults_pseudo_timestep",
            Stage::Numerics => "numerics_bp_tn_2305",
            Stage::Initialization => "init_standard_01",
            Stage::PrePostproc => "prepost_01",
            Stage::Postproc => "post_01",
            Stage::ParametricStudy => "study_01",
            Stage::ParametricStudyPost => "studyPost_01",
        }
    }
}

/// Overlay `local` on `global` (shallow) and pick the recipe for `stage`.
///
/// Returns the recipe and the merged table with the chosen recipe written in.
pub fn dispatch(
    stage: Stage,
    local: Option<&FunctionTable>,
    global: &FunctionTable,
    default: &str,
) -> (String, FunctionTable) {
    let mut merged = global.clone();
    if let Some(local) = local {
        crate::tree::overlay_shallow(&mut merged, local);
    }
    let recipe = match merged.get(stage.key()).and_then(as_text) {
        Some(name) if !name.is_empty() => name,
        _ => {
            merged.insert(stage.key().to_string(), Value::from(default));
            default.to_string()
        }
    };
    (recipe, merged)
}

impl Case {
    /// Select the recipe for `stage` and persist the merged table in the case.
    pub fn dispatch(&mut self, stage: Stage, global: &FunctionTable, gpu: bool) -> String {
        let local = self.functions().cloned();
        let (recipe, merged) = dispatch(stage, local.as_ref(), global, stage.default_recipe(gpu));
        self.set_functions(merged);
        recipe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(v: Value) -> FunctionTable {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn local_table_wins() {
        let global = table(json!({"initialization": "init_hybrid_01", "setup": "setup_incompressible_01"}));
        let local = table(json!({"initialization": "init_fmg_01"}));
        let (recipe, merged) = dispatch(Stage::Initialization, Some(&local), &global, "init_standard_01");
        assert_eq!(recipe, "init_fmg_01");
        assert_eq!(merged["setup"], json!("setup_incompressible_01"));
    }

    #[test]
    fn default_is_written_back() {
        let (recipe, merged) = dispatch(Stage::Numerics, None, &Map::new(), "numerics_defaults");
        assert_eq!(recipe, "numerics_defaults");
        assert_eq!(merged["numerics"], json!("numerics_defaults"));
    }

    #[test]
    fn case_dispatch_persists_table() {
        let mut case = Case::new("c", table(json!({"functions": {"postproc": "post_none"}})));
        let global = table(json!({"setup": "setup_bc_only_01"}));
        assert_eq!(case.dispatch(Stage::Postproc, &global, false), "post_none");
        assert_eq!(case.dispatch(Stage::Numerics, &global, true), "numerics_defaults_pseudo_timestep");
        let functions = case.body()["functions"].as_object().unwrap();
        assert_eq!(functions["setup"], json!("setup_bc_only_01"));
        assert_eq!(functions["numerics"], json!("numerics_defaults_pseudo_timestep"));
    }

    #[test]
    fn stage_keys_are_unique() {
        let keys: std::collections::HashSet<_> = Stage::ALL.iter().map(|s| s.key()).collect();
        assert_eq!(keys.len(), Stage::ALL.len());
    }
}
