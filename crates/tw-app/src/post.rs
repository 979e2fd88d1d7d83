//! Per-case post-processing: parameter and summary files, span-wise plots,
//! the report table and its charts.

use crate::error::AppResult;
use crate::stages;
use serde_json::{Value, json};
use std::fs;
use std::path::PathBuf;
use tw_results::casetable::write_run_charts;
use tw_results::{
    CaseTableInputs, MonitorSummary, ROLLING_WINDOW, ReportFile, Table, TranscriptSummary,
    case_report_table, latest_report_file, scrape_transcript, summarize,
};
use tw_setup::reports::{HEAT_BALANCE_REPORT, MASS_BALANCE_REPORT};
use tw_setup::{SetupOutcome, StageContext};

pub const ISO_SURFACES: &str = "results/surfaces/iso_surface";
pub const CONTOURS: &str = "results/graphics/contour";
const FIELD_NAMES: &str = "results/field_names";
const SPAN_FIELD: &str = "spanwise-coordinate";
const DEFAULT_SPANS: [f64; 1] = [0.5];
const DEFAULT_SPAN_FIELDS: [&str; 1] = ["pressure"];
const PSEUDO_TIME_STEP: &str =
    "solution/run_calculation/pseudo_time_settings/time_step_method/pseudo_time_step_size";

/// `rotor-span-50` for 50 % span of topology `rotor`.
pub fn span_surface_name(topology: &str, span: f64) -> String {
    format!("{topology}-span-{}", (span * 100.0).round() as i64)
}

/// Iso-surfaces at every configured span of every topology.
pub fn prepare_span_surfaces(
    ctx: &mut StageContext<'_>,
    topologies: &[String],
) -> AppResult<Vec<String>> {
    let key = "results.span_plot_height";
    let spans = ctx
        .case
        .f64_list_or("results", "span_plot_height", &DEFAULT_SPANS);
    let mut created = Vec::new();
    for topology in topologies {
        for span in &spans {
            if !(0.0..=1.0).contains(span) {
                tracing::warn!(key, "span {span} outside [0, 1]");
                continue;
            }
            let name = span_surface_name(topology, *span);
            if !ctx.driver.try_create(ISO_SURFACES, &name, key)? {
                continue;
            }
            let path = format!("{ISO_SURFACES}/{name}");
            ctx.driver
                .try_set(&format!("{path}/field"), Value::from(SPAN_FIELD), key)?;
            ctx.driver
                .try_set(&format!("{path}/iso_values"), json!([span]), key)?;
            ctx.driver.try_set(
                &format!("{path}/turbo_topology"),
                Value::from(topology.as_str()),
                key,
            )?;
            created.push(name);
        }
    }
    Ok(created)
}

/// Outline picture of the mesh as `Mesh.avz`.
pub fn save_mesh_snapshot(ctx: &mut StageContext<'_>) -> AppResult<bool> {
    let file = ctx.layout.solver_file("Mesh.avz");
    let key = "results";
    if !ctx.driver.try_tui("/display/mesh-outline", key)? {
        return Ok(false);
    }
    Ok(ctx
        .driver
        .try_tui(&format!("/display/save-picture \"{file}\""), key)?)
}

/// Contour plots of the configured fields on the span iso-surfaces.
pub fn span_contours(ctx: &mut StageContext<'_>, topologies: &[String]) -> AppResult<Vec<String>> {
    let key = "results.span_plot_var";
    let requested = ctx
        .case
        .list_or("results", "span_plot_var", &DEFAULT_SPAN_FIELDS);
    let spans = ctx
        .case
        .f64_list_or("results", "span_plot_height", &DEFAULT_SPANS);
    let allowed = ctx.driver.allowed_values(FIELD_NAMES);
    let fields: Vec<String> = requested
        .into_iter()
        .filter(|field| {
            let known = allowed.is_empty() || allowed.contains(field);
            if !known {
                tracing::warn!(key, "field '{field}' is not available, no span plot");
            }
            known
        })
        .collect();

    let mut created = Vec::new();
    for topology in topologies {
        for span in &spans {
            let surface = span_surface_name(topology, *span);
            if !ctx.driver.exists(&format!("{ISO_SURFACES}/{surface}")) {
                tracing::debug!(surface = %surface, "no iso-surface, span plots skipped");
                continue;
            }
            for field in &fields {
                let name = format!("{surface}-{field}");
                if !ctx.driver.try_create(CONTOURS, &name, key)? {
                    continue;
                }
                let path = format!("{CONTOURS}/{name}");
                ctx.driver
                    .try_set(&format!("{path}/field"), Value::from(field.as_str()), key)?;
                ctx.driver
                    .try_set(&format!("{path}/surfaces_list"), json!([surface]), key)?;
                let picture = ctx.layout.solver_file(&format!("{name}.png"));
                if ctx
                    .driver
                    .try_tui(&format!("/display/objects/display {name}"), key)?
                {
                    ctx.driver
                        .try_tui(&format!("/display/save-picture \"{picture}\""), key)?;
                }
                created.push(name);
            }
        }
    }
    Ok(created)
}

fn log_time_statistics(case: &str, transcript: &TranscriptSummary) {
    match (transcript.wall_clock_s, transcript.iterations) {
        (Some(wall), Some(iterations)) if iterations > 0 => tracing::info!(
            case,
            wall_clock_s = wall,
            iterations,
            per_iteration_s = wall / iterations as f64,
            compute_nodes = transcript.compute_nodes.unwrap_or(0),
            "time statistics"
        ),
        (Some(wall), _) => tracing::info!(case, wall_clock_s = wall, "time statistics"),
        _ => tracing::info!(case, "no timing in transcript"),
    }
}

/// First number in a compute result: a bare number, `[value, unit]`, or a
/// mapping keyed by report name.
fn first_number(value: &Value, report: &str) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Array(items) => items.iter().find_map(|v| first_number(v, report)),
        Value::Object(map) => map.get(report).and_then(|v| first_number(v, report)),
        _ => None,
    }
}

fn balance(ctx: &mut StageContext<'_>, report: &str) -> AppResult<Option<f64>> {
    if !ctx
        .driver
        .exists(&format!("solution/report_definitions/flux/{report}"))
    {
        return Ok(None);
    }
    let computed = ctx.driver.try_invoke(
        "solution/report_definitions/compute",
        json!({"report_defs": [report]}),
        "results",
    )?;
    Ok(computed.and_then(|v| first_number(&v, report)))
}

fn pseudo_time_step(ctx: &StageContext<'_>) -> Option<f64> {
    ctx.case
        .f64_in("solution", "pseudo_timestep")
        .or_else(|| ctx.driver.get(PSEUDO_TIME_STEP).ok().and_then(|v| v.as_f64()))
}

fn monitors(ctx: &StageContext<'_>, setup: &SetupOutcome) -> Vec<MonitorSummary> {
    let stem = format!("{}_report", ctx.case.filename());
    let Some(path) = latest_report_file(ctx.layout.case_dir(), &stem) else {
        if !setup.reports.reports.is_empty() {
            tracing::warn!(key = "solution.reportlist", "no report file written for case '{}'", ctx.case.name());
        }
        return Vec::new();
    };
    match ReportFile::read(&path) {
        Ok(file) => summarize(&file, ROLLING_WINDOW),
        Err(e) => {
            tracing::warn!(key = "solution.reportlist", "{e}");
            Vec::new()
        }
    }
}

/// What the post stage of one case produced.
#[derive(Debug, Clone)]
pub struct CasePost {
    pub table: Table,
    pub table_file: PathBuf,
    pub charts: Vec<PathBuf>,
}

/// The `post_01` recipe.
pub fn run_post(
    ctx: &mut StageContext<'_>,
    setup: &SetupOutcome,
    plot: bool,
) -> AppResult<CasePost> {
    let filename = ctx.case.filename();
    let key = "results";
    let parameters = ctx
        .layout
        .solver_file(&format!("{filename}_outParameters.out"));
    ctx.driver.try_invoke(
        "parameters/output_parameters/write_all_to_file",
        json!({"file_name": parameters}),
        key,
    )?;
    let summary = ctx.layout.solver_file(&format!("{filename}_summary.sum"));
    ctx.driver
        .try_invoke("results/report/summary", json!({"file_name": summary}), key)?;

    span_contours(ctx, &setup.topologies)?;

    let transcript = fs::read_to_string(stages::transcript_file(ctx))
        .ok()
        .map(|text| scrape_transcript(&text));
    if let Some(t) = &transcript {
        log_time_statistics(ctx.case.name(), t);
    }

    let monitors = monitors(ctx, setup);
    let mass_balance = balance(ctx, MASS_BALANCE_REPORT)?;
    let heat_balance = if ctx.energy_enabled() {
        balance(ctx, HEAT_BALANCE_REPORT)?
    } else {
        None
    };
    let table = case_report_table(&CaseTableInputs {
        name: ctx.case.name(),
        name_column: "Case",
        pseudo_time_step: pseudo_time_step(ctx),
        monitors: &monitors,
        mass_balance,
        heat_balance,
        transcript: transcript.as_ref(),
    });
    let table_file = ctx.layout.file(&format!("{filename}_reporttable.csv"));
    table.write_csv(&table_file)?;
    tracing::info!(case = ctx.case.name(), file = %table_file.display(), "report table written");

    let charts = if plot {
        let active: Vec<String> = setup
            .reports
            .cov_reports
            .iter()
            .filter_map(|r| r.strip_suffix("-cov"))
            .map(str::to_string)
            .collect();
        write_run_charts(ctx.layout.case_dir(), &monitors, &active, transcript.as_ref())?
    } else {
        Vec::new()
    };

    Ok(CasePost {
        table,
        table_file,
        charts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_names_use_percent() {
        assert_eq!(span_surface_name("rotor", 0.5), "rotor-span-50");
        assert_eq!(span_surface_name("stator", 0.25), "stator-span-25");
    }

    #[test]
    fn compute_results_in_any_shape() {
        assert_eq!(first_number(&json!(-0.25), "mass-balance"), Some(-0.25));
        assert_eq!(first_number(&json!([1.5, "kg/s"]), "mass-balance"), Some(1.5));
        assert_eq!(
            first_number(&json!([{"mass-balance": [0.5, "kg/s"]}]), "mass-balance"),
            Some(0.5)
        );
        assert_eq!(first_number(&json!({"other": 1.0}), "mass-balance"), None);
    }
}
