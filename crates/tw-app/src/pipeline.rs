//! The per-case pipeline, from mesh import to the stopped transcript.

use crate::error::AppResult;
use crate::post::{self, CasePost};
use crate::progress::{Progress, RunStage};
use crate::stages::{self, JournalPoint};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tw_config::{Case, FunctionTable, Stage};
use tw_driver::Driver;
use tw_results::{CaseManifest, CaseStatus, RunStore, Table, compute_case_hash};
use tw_setup::{
    CaseLayout, NumericsRecipe, SetupError, SetupOutcome, SetupRecipe, StageContext, numerics,
    reports, run_setup,
};
use tw_solve::{InitRecipe, initialize, run_solver, write_case_data};

/// What every case of a run shares.
pub struct PipelineOptions<'a> {
    pub global: &'a FunctionTable,
    pub working_dir: &'a Path,
    pub store: &'a RunStore,
    pub plot: bool,
}

/// Outcome of one case.
#[derive(Debug, Clone)]
pub struct CaseReport {
    pub name: String,
    pub status: CaseStatus,
    pub iterations: usize,
    pub report_table: Option<Table>,
    pub report_table_file: Option<PathBuf>,
    pub message: Option<String>,
}

impl CaseReport {
    pub fn failed(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: CaseStatus::Failed,
            iterations: 0,
            report_table: None,
            report_table_file: None,
            message: Some(message.into()),
        }
    }
}

enum StagesOutcome {
    Completed {
        iterations: usize,
        post: Option<CasePost>,
    },
    Failed(String),
}

pub(crate) fn unknown_recipe(stage: Stage, recipe: &str) {
    warn!(key = %format!("functions.{}", stage.key()), "unknown recipe '{recipe}', stage skipped");
}

fn setup_error_key(e: &SetupError) -> &'static str {
    match e {
        SetupError::Template { .. } => "expressionTemplate",
        _ => "fluid_properties",
    }
}

/// Run one case. Structural problems fail the case and return normally;
/// only fatal solver errors come back as `Err`.
pub fn run_case(
    driver: &mut Driver,
    case: &mut Case,
    options: &PipelineOptions<'_>,
    progress: &mut Progress<'_>,
) -> AppResult<CaseReport> {
    let name = case.name().to_string();
    let layout = CaseLayout::new(options.working_dir, &name);
    fs::create_dir_all(layout.case_dir())?;
    let solver_version = driver.version().to_string();
    let case_hash = compute_case_hash(case.body(), &solver_version);
    let table_file = layout.file(&format!("{}_reporttable.csv", case.filename()));

    if case.skip_execution() {
        info!(case = %name, "skip_execution is set, case not run");
        progress.emit(Some(&name), RunStage::CaseSkipped, None);
        options.store.save(&CaseManifest::new(
            &name,
            case_hash,
            CaseStatus::Skipped,
            &solver_version,
        ))?;
        // an earlier run's table still takes part in the merged table
        let report_table = Table::read_csv(&table_file).ok();
        return Ok(CaseReport {
            name,
            status: CaseStatus::Skipped,
            iterations: 0,
            report_table_file: report_table.as_ref().map(|_| table_file),
            report_table,
            message: None,
        });
    }

    let mut ctx = StageContext::new(driver, case, &layout);
    stages::start_transcript(&mut ctx)?;
    let outcome = run_stages(&mut ctx, options, progress)?;
    if matches!(outcome, StagesOutcome::Completed { .. }) {
        stages::run_journals(&mut ctx, JournalPoint::PreExit)?;
    }
    stages::stop_transcript(&mut ctx)?;

    let report = match outcome {
        StagesOutcome::Completed { iterations, post } => CaseReport {
            name: name.clone(),
            status: CaseStatus::Completed,
            iterations,
            report_table_file: post.as_ref().map(|p| p.table_file.clone()),
            report_table: post.map(|p| p.table),
            message: None,
        },
        StagesOutcome::Failed(message) => {
            warn!(case = %name, "case failed: {message}");
            CaseReport::failed(&name, message)
        }
    };

    let mut manifest = CaseManifest::new(&name, case_hash, report.status, &solver_version);
    manifest.iterations = report.iterations;
    if let Some(message) = &report.message {
        manifest = manifest.with_message(message.clone());
    }
    options.store.save(&manifest)?;
    Ok(report)
}

fn run_stages(
    ctx: &mut StageContext<'_>,
    options: &PipelineOptions<'_>,
    progress: &mut Progress<'_>,
) -> AppResult<StagesOutcome> {
    let name = ctx.case.name().to_string();
    let gpu = ctx.driver.is_gpu();

    progress.emit(Some(&name), RunStage::MeshImport, None);
    if !stages::import_mesh(ctx)? {
        return Ok(StagesOutcome::Failed("mesh could not be read".to_string()));
    }
    stages::run_journals(ctx, JournalPoint::PostMeshImport)?;

    progress.emit(Some(&name), RunStage::Setup, None);
    let recipe = ctx.case.dispatch(Stage::Setup, options.global, gpu);
    let setup = match SetupRecipe::from_name(&recipe) {
        Some(recipe) => match run_setup(ctx, recipe) {
            Ok(outcome) => outcome,
            Err(e) if e.skips_case() => {
                warn!(key = setup_error_key(&e), case = %name, "{e}");
                return Ok(StagesOutcome::Failed(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        },
        None => {
            unknown_recipe(Stage::Setup, &recipe);
            SetupOutcome::default()
        }
    };

    progress.emit(Some(&name), RunStage::Numerics, None);
    let recipe = ctx.case.dispatch(Stage::Numerics, options.global, gpu);
    match NumericsRecipe::from_name(&recipe) {
        Some(recipe) => numerics::apply(ctx, recipe)?,
        None => unknown_recipe(Stage::Numerics, &recipe),
    }
    reports::run_calculation(ctx)?;

    stages::run_journals(ctx, JournalPoint::PreInit)?;
    progress.emit(Some(&name), RunStage::Initialization, None);
    let recipe = ctx.case.dispatch(Stage::Initialization, options.global, gpu);
    if InitRecipe::from_name(&recipe).is_some() {
        initialize(ctx, InitRecipe::select(&recipe, gpu))?;
    } else {
        unknown_recipe(Stage::Initialization, &recipe);
    }

    let recipe = ctx.case.dispatch(Stage::PrePostproc, options.global, gpu);
    match recipe.as_str() {
        "prepost_01" => {
            post::prepare_span_surfaces(ctx, &setup.topologies)?;
            post::save_mesh_snapshot(ctx)?;
        }
        "prepost_none" => {}
        other => unknown_recipe(Stage::PrePostproc, other),
    }

    progress.emit(Some(&name), RunStage::WritingCase, None);
    write_case_data(ctx, "")?;
    let settings = ctx
        .layout
        .solver_file(&format!("{}.set", ctx.case.filename()));
    ctx.driver.try_invoke(
        "file/write_settings",
        json!({"file_name": settings}),
        "caseFilename",
    )?;
    stages::run_journals(ctx, JournalPoint::PreSolve)?;

    progress.emit(Some(&name), RunStage::Solving, None);
    let solved = run_solver(ctx)?;

    let recipe = ctx.case.dispatch(Stage::Postproc, options.global, gpu);
    let post = match recipe.as_str() {
        "post_01" => {
            progress.emit(Some(&name), RunStage::PostProcessing, None);
            Some(post::run_post(ctx, &setup, options.plot)?)
        }
        "post_none" => None,
        other => {
            unknown_recipe(Stage::Postproc, other);
            None
        }
    };

    Ok(StagesOutcome::Completed {
        iterations: solved.iterations,
        post,
    })
}
