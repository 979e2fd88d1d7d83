//! The parametric study driver.
//!
//! A study reads the base case-data, duplicates the Base DP for every column
//! of every definition block, updates the design points and saves the project.
//! The solver names new design points; the driver always reads them back from
//! the tail of the design-point list.

use crate::design_points::plan_design_points;
use crate::layout::StudyLayout;
use crate::StudyResult;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tw_config::{InitMethod, StudyDef, validate_study};
use tw_driver::{Driver, Feature};

const STUDIES: &str = "parametric_studies";
const BASE_DP: &str = "Base DP";

#[derive(Debug, Clone, PartialEq)]
pub struct StudyOutcome {
    /// Solver-side study name.
    pub solver_study: String,
    pub project: PathBuf,
    pub design_points: Vec<String>,
    pub updated: bool,
}

/// Why a study must not run, if it must not.
pub fn skip_reason(def: &StudyDef, layout: &StudyLayout) -> Option<String> {
    let project = layout.project();
    let exists = project.exists() || layout.database().exists();
    if def.run_existing_project {
        return (!project.exists())
            .then(|| format!("runExistingProject is set but {} does not exist", project.display()));
    }
    (exists && !def.overwrite_existing).then(|| {
        format!(
            "{} already exists and overwriteExisting is false",
            project.display()
        )
    })
}

fn study_path(study: &str) -> String {
    format!("{STUDIES}/{study}")
}

fn dp_container(study: &str) -> String {
    format!("{}/design_points", study_path(study))
}

fn file_stem(file: &str) -> String {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    name.split('.').next().unwrap_or(name).to_string()
}

/// Runs the studies of one wizard invocation; earlier studies change how later
/// ones read their case and name their project.
#[derive(Debug, Default)]
pub struct StudyRunner {
    studies_run: usize,
    saved_projects: Vec<PathBuf>,
}

impl StudyRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(
        &mut self,
        driver: &mut Driver,
        def: &StudyDef,
        layout: &mut StudyLayout,
    ) -> StudyResult<Option<StudyOutcome>> {
        let name = layout.name().to_string();
        let key = format!("studies.{name}");
        if let Some(reason) = skip_reason(def, layout) {
            warn!(key = %key, "skipping study {name}: {reason}");
            return Ok(None);
        }
        if let Err(e) = validate_study(&name, def) {
            warn!(key = %key, "skipping study {name}: {e}");
            return Ok(None);
        }
        fs::create_dir_all(layout.study_dir())?;
        info!(study = %name, "parametric study");

        let solver_study = if def.run_existing_project {
            self.open_project(driver, def, layout)?
        } else {
            self.new_project(driver, def, layout)?
        };
        let Some(solver_study) = solver_study else {
            warn!(key = %key, "skipping study {name}: no parametric study in the solver");
            return Ok(None);
        };
        self.studies_run += 1;

        let design_points = construct_design_points(driver, &solver_study, def, &key)?;
        apply_init_method(driver, &solver_study, def.init_method, &key)?;
        apply_reread_policy(driver, &solver_study, def.reread_case, &key)?;

        let updated = def.update_all_dps
            && driver
                .try_invoke(
                    &format!("{}/update_all", dp_container(&solver_study)),
                    json!({}),
                    &format!("{key}.updateAllDPs"),
                )?
                .is_some();
        if !def.update_all_dps {
            info!(study = %name, "design points left for a later update");
        }

        driver.try_invoke(
            &format!("{}/export_design_table", study_path(&solver_study)),
            json!({"filepath": layout.dp_table().to_string_lossy()}),
            &key,
        )?;

        let project = self.project_for_save(layout.project());
        driver.try_invoke(
            "file/parametric_project/save_as",
            json!({"project_filename": project.to_string_lossy()}),
            &format!("{key}.projectFilename"),
        )?;
        layout.set_project(project.clone());
        self.saved_projects.push(project.clone());

        write_cov_snapshot(driver, &solver_study, layout)?;

        Ok(Some(StudyOutcome {
            solver_study,
            project,
            design_points,
            updated,
        }))
    }

    fn new_project(
        &mut self,
        driver: &mut Driver,
        def: &StudyDef,
        layout: &StudyLayout,
    ) -> StudyResult<Option<String>> {
        let key = format!("studies.{}.refCaseFilename", layout.name());
        let case_file = def.ref_case_filename.as_str();
        let structured = self.studies_run == 0 || driver.supports(Feature::StructuredStudyCaseRead);
        let read = if structured {
            driver
                .try_invoke("file/read_case_data", json!({"file_name": case_file}), &key)?
                .is_some()
        } else {
            driver.try_tui(&format!("/file/read-case-data {case_file} yes"), &key)?
        };
        if !read {
            return Ok(None);
        }
        let created = driver.try_invoke(&format!("{STUDIES}/initialize"), json!({}), &key)?;
        Ok(created.map(|v| {
            v.as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-Solve", file_stem(case_file)))
        }))
    }

    fn open_project(
        &mut self,
        driver: &mut Driver,
        def: &StudyDef,
        layout: &StudyLayout,
    ) -> StudyResult<Option<String>> {
        let key = format!("studies.{}.projectFilename", layout.name());
        let opened = driver.try_invoke(
            "file/parametric_project/open",
            json!({"project_filename": layout.project().to_string_lossy()}),
            &key,
        )?;
        if opened.is_none() {
            return Ok(None);
        }
        let expected = format!("{}-Solve", file_stem(&def.ref_case_filename));
        let studies = driver.children(STUDIES);
        Ok(studies
            .iter()
            .find(|s| **s == expected)
            .or_else(|| studies.first())
            .cloned())
    }

    /// Studies sharing a project filename in one run get `_1`, `_2` ... stems.
    fn project_for_save(&self, project: &Path) -> PathBuf {
        let mut candidate = project.to_path_buf();
        let stem = project
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = project
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "flprj".to_string());
        let mut index = 1;
        while self.saved_projects.contains(&candidate) {
            candidate = project.with_file_name(format!("{stem}_{index}.{extension}"));
            index += 1;
        }
        candidate
    }
}

fn base_inputs(driver: &Driver, study: &str) -> HashMap<String, f64> {
    driver
        .get(&format!("{}/{BASE_DP}/input_parameters", dp_container(study)))
        .ok()
        .and_then(|v| v.as_object().cloned())
        .map(|inputs| {
            inputs
                .into_iter()
                .filter_map(|(k, v)| v.as_f64().map(|f| (k, f)))
                .collect()
        })
        .unwrap_or_default()
}

fn construct_design_points(
    driver: &mut Driver,
    study: &str,
    def: &StudyDef,
    key: &str,
) -> StudyResult<Vec<String>> {
    let container = dp_container(study);
    let base = base_inputs(driver, study);
    let mut created = Vec::new();

    for (index, block) in def.definition.iter().enumerate() {
        let block_key = format!("{key}.definition[{index}]");
        let plans = match plan_design_points(block, &base) {
            Ok(plans) => plans,
            Err(e) => {
                warn!(key = %block_key, "skipping definition block: {e}");
                continue;
            }
        };
        for plan in plans {
            let duplicated = driver.try_invoke(
                &format!("{container}/duplicate"),
                json!({"design_point": BASE_DP}),
                &block_key,
            )?;
            if duplicated.is_none() {
                continue;
            }
            let Some(dp) = driver.children(&container).last().cloned() else {
                continue;
            };
            let dp_path = format!("{container}/{dp}");
            for (parameter, value) in &plan.values {
                driver.try_set(
                    &format!("{dp_path}/input_parameters/{parameter}"),
                    Value::from(*value),
                    &format!("{block_key}.inputparameters"),
                )?;
            }
            driver.try_set(
                &format!("{dp_path}/write_data"),
                Value::from(def.write_data),
                &format!("{key}.write_data"),
            )?;
            driver.try_set(
                &format!("{dp_path}/capture_simulation_report_data"),
                Value::from(def.simulation_report),
                &format!("{key}.simulation_report"),
            )?;
            created.push(dp);
        }
    }
    info!(study, count = created.len(), "design points created");
    Ok(created)
}

fn apply_init_method(
    driver: &mut Driver,
    study: &str,
    method: InitMethod,
    key: &str,
) -> StudyResult<()> {
    let command = match method {
        InitMethod::BaseIni => return Ok(()),
        InitMethod::BaseDp => "use_base_data",
        InitMethod::PrevDp => "use_data_of_previous_dp",
    };
    driver.try_invoke(
        &format!("{}/{command}", study_path(study)),
        json!({}),
        &format!("{key}.initMethod"),
    )?;
    Ok(())
}

fn apply_reread_policy(
    driver: &mut Driver,
    study: &str,
    reread_case: bool,
    key: &str,
) -> StudyResult<()> {
    if reread_case {
        return Ok(());
    }
    let key = format!("{key}.reread_case");
    if !driver.supports(Feature::RereadCaseToggle) {
        warn!(key = %key, "this solver version always rereads the case per design point");
        return Ok(());
    }
    driver.try_set(
        &format!("{}/reread_case", study_path(study)),
        Value::from(false),
        &key,
    )?;
    Ok(())
}

/// Convergence reports and residual equation count for the post-processor.
fn write_cov_snapshot(driver: &Driver, study: &str, layout: &StudyLayout) -> StudyResult<()> {
    let convergence_reports = driver
        .get("solution/monitor/convergence_conditions/convergence_reports")
        .unwrap_or_else(|_| json!({}));
    let equation_count = driver
        .children("solution/monitor/residual/equations")
        .len();
    let snapshot = json!({
        "solver_study": study,
        "project": layout.project().to_string_lossy(),
        "convergence_reports": convergence_reports,
        "equation_count": equation_count,
    });
    fs::write(layout.temp_data(), serde_json::to_string_pretty(&snapshot)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_project_names_get_suffixes() {
        let mut runner = StudyRunner::new();
        let project = Path::new("/work/studyX.flprj");
        assert_eq!(runner.project_for_save(project), project);
        runner.saved_projects.push(project.to_path_buf());
        assert_eq!(
            runner.project_for_save(project),
            PathBuf::from("/work/studyX_1.flprj")
        );
        runner.saved_projects.push(PathBuf::from("/work/studyX_1.flprj"));
        assert_eq!(
            runner.project_for_save(project),
            PathBuf::from("/work/studyX_2.flprj")
        );
    }

    #[test]
    fn stems_drop_double_extensions() {
        assert_eq!(file_stem("/data/caseA_fin.cas.h5"), "caseA_fin");
    }
}
