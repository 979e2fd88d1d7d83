//! Run execution: load the configuration, launch the solver once, run every
//! case and study, then tear down.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tw_config::{Config, Stage, dispatch, load_config, validate_config};
use tw_driver::Driver;
use tw_results::{CaseStatus, RunStore, Table};
use tw_study::{
    StudyLayout, StudyOutcome, StudyPostOutcome, StudyPostRecipe, StudyRecipe, StudyRunner,
    post_process,
};

use crate::error::AppResult;
use crate::launcher::SessionLauncher;
use crate::pipeline::{CaseReport, PipelineOptions, run_case, unknown_recipe};
use crate::progress::{Progress, RunProgressEvent, RunStage};

pub const MERGED_TABLE: &str = "mergedReporttable.csv";
/// Prefix of the scratch scripts a solver leaves in its working directory.
pub const SCRATCH_PREFIX: &str = "cleanup-fluent-";

#[derive(Debug, Clone)]
pub struct StudyReport {
    pub name: String,
    pub outcome: Option<StudyOutcome>,
    pub post: Option<StudyPostOutcome>,
}

/// Everything one wizard run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// RFC 3339, UTC.
    pub started_at: String,
    pub cases: Vec<CaseReport>,
    pub studies: Vec<StudyReport>,
    pub merged_table: Option<PathBuf>,
    pub debug_dump: PathBuf,
    pub unused_keys: Vec<String>,
    pub removed_scratch_files: usize,
}

impl RunSummary {
    pub fn count(&self, status: CaseStatus) -> usize {
        self.cases.iter().filter(|c| c.status == status).count()
    }
}

/// Execute the wizard for one configuration file.
pub fn run_wizard(config_path: &Path, launcher: &mut dyn SessionLauncher) -> AppResult<RunSummary> {
    run_wizard_with_progress(config_path, launcher, None)
}

/// Execute the wizard and stream stage progress events.
pub fn run_wizard_with_progress(
    config_path: &Path,
    launcher: &mut dyn SessionLauncher,
    progress_cb: Option<&mut dyn FnMut(RunProgressEvent)>,
) -> AppResult<RunSummary> {
    let started_at = chrono::Utc::now().to_rfc3339();
    let mut progress = Progress::new(progress_cb);

    progress.emit(
        None,
        RunStage::LoadingConfig,
        Some(config_path.display().to_string()),
    );
    let mut config = load_config(config_path)?;
    for (key, e) in validate_config(&config) {
        warn!(key = %key, "{e}");
    }
    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)?;
    let working_dir = config.working_dir().to_path_buf();
    let launching = config.launching().clone();

    progress.emit(None, RunStage::Launching, None);
    let session = launcher.launch(&config)?;
    let mut driver = Driver::new(session, launching.gpu)?;

    let store = RunStore::new(output_dir.clone())?;
    let global = config.global_functions();
    let options = PipelineOptions {
        global: &global,
        working_dir: &working_dir,
        store: &store,
        plot: launching.plot_results,
    };

    let mut unused_keys = Vec::new();
    let case_names = config.case_names();
    let mut cases = Vec::with_capacity(case_names.len());
    for name in &case_names {
        let mut case = match config.resolve_case(name) {
            Ok(case) => case,
            Err(e) => {
                warn!(key = %format!("cases.{name}"), "case skipped: {e}");
                cases.push(CaseReport::failed(name, e.to_string()));
                continue;
            }
        };
        info!(case = %name, "case");
        let report = run_case(&mut driver, &mut case, &options, &mut progress)?;
        if report.status != CaseStatus::Skipped {
            unused_keys.extend(
                case.unused_keys()
                    .into_iter()
                    .map(|k| format!("cases.{name}.{k}")),
            );
        }
        config.store_case(&case);
        cases.push(report);
    }

    let merged_table = if case_names.len() > 1 {
        merge_tables(&cases, &output_dir.join(MERGED_TABLE))?
    } else {
        None
    };

    let studies = run_studies(&mut config, &mut driver, &mut progress, &mut unused_keys)?;

    progress.emit(None, RunStage::Finishing, None);
    unused_keys.extend(config.unused_top_level_keys());
    unused_keys.extend(config.unused_launching_keys());
    for key in &unused_keys {
        warn!(key = %key, "configuration key was not used");
    }
    let debug_dump = config.write_debug_dump()?;
    info!(file = %debug_dump.display(), "debug dump written");

    if launching.exitatend {
        driver.exit()?;
    }
    let removed_scratch_files = if launching.ptw_cleanup {
        remove_scratch_files(&working_dir)?
    } else {
        0
    };

    progress.emit(None, RunStage::Completed, None);
    Ok(RunSummary {
        started_at,
        cases,
        studies,
        merged_table,
        debug_dump,
        unused_keys,
        removed_scratch_files,
    })
}

/// Concatenate the per-case tables; `None` when no case produced one.
fn merge_tables(cases: &[CaseReport], path: &Path) -> AppResult<Option<PathBuf>> {
    let tables: Vec<&Table> = cases.iter().filter_map(|c| c.report_table.as_ref()).collect();
    if tables.is_empty() {
        return Ok(None);
    }
    Table::concat(tables).write_csv(path)?;
    info!(file = %path.display(), "merged report table written");
    Ok(Some(path.to_path_buf()))
}

fn run_studies(
    config: &mut Config,
    driver: &mut Driver,
    progress: &mut Progress<'_>,
    unused_keys: &mut Vec<String>,
) -> AppResult<Vec<StudyReport>> {
    let global = config.global_functions();
    let working_dir = config.working_dir().to_path_buf();
    let plot = config.launching().plot_results;
    let gpu = driver.is_gpu();
    let mut runner = StudyRunner::new();
    let mut reports = Vec::new();

    for name in config.study_names() {
        let key = format!("studies.{name}");
        let def = match config.study(&name) {
            Ok(def) => def,
            Err(e) => {
                warn!(key = %key, "study skipped: {e}");
                continue;
            }
        };
        unused_keys.extend(def.extra.keys().map(|k| format!("{key}.{k}")));
        if def.is_skipped() {
            info!(study = %name, "skip_execution is set, study not run");
            reports.push(StudyReport {
                name,
                outcome: None,
                post: None,
            });
            continue;
        }

        let mut layout = StudyLayout::new(&working_dir, &name, &def);
        progress.emit(Some(&name), RunStage::ParametricStudy, None);
        let stage = Stage::ParametricStudy;
        let (recipe, _) = dispatch(stage, def.functions.as_ref(), &global, stage.default_recipe(gpu));
        let outcome = match StudyRecipe::from_name(&recipe) {
            Some(StudyRecipe::Study01) => runner.run(driver, &def, &mut layout)?,
            None => {
                unknown_recipe(stage, &recipe);
                None
            }
        };

        progress.emit(Some(&name), RunStage::StudyPostProcessing, None);
        let stage = Stage::ParametricStudyPost;
        let (recipe, _) = dispatch(stage, def.functions.as_ref(), &global, stage.default_recipe(gpu));
        let post = match StudyPostRecipe::from_name(&recipe) {
            Some(StudyPostRecipe::StudyPost01) => post_process(&layout, &def, plot)?,
            None => {
                unknown_recipe(stage, &recipe);
                None
            }
        };

        config.store_study(&name, &def)?;
        reports.push(StudyReport {
            name,
            outcome,
            post,
        });
    }
    Ok(reports)
}

/// Delete the solver's `cleanup-fluent-*` scripts from `dir`.
pub fn remove_scratch_files(dir: &Path) -> AppResult<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(SCRATCH_PREFIX));
        if is_scratch && entry.path().is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        info!(removed, dir = %dir.display(), "solver scratch files removed");
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_solver_scratch_files_are_removed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cleanup-fluent-node1-1234.sh"), "").unwrap();
        fs::write(dir.path().join("cleanup-fluent-node1-5678.sh"), "").unwrap();
        fs::write(dir.path().join("caseA.cas.h5"), "").unwrap();
        assert_eq!(remove_scratch_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("caseA.cas.h5").exists());
        assert_eq!(remove_scratch_files(dir.path()).unwrap(), 0);
    }
}
