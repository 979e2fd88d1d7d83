//! Report definitions, the report file, residual monitors, CoV convergence
//! reports, the convergence condition and run-calculation controls.

use crate::context::{StageContext, report_name};
use crate::error::SetupResult;
use serde_json::{Map, Value, json};
use tw_config::tree::{as_bool, as_text, f64_list, string_list};
use tw_driver::Feature;

const DEFINITIONS: &str = "solution/report_definitions";
const REPORT_PLOTS: &str = "solution/monitor/report_plots";
const REPORT_FILES: &str = "solution/monitor/report_files";
const RESIDUAL: &str = "solution/monitor/residual";
const CONVERGENCE: &str = "solution/monitor/convergence_conditions";
const RUN_CALCULATION: &str = "solution/run_calculation";

pub const REPORT_FILE: &str = "report-file";
pub const MASS_BALANCE_REPORT: &str = "mass-balance";
pub const HEAT_BALANCE_REPORT: &str = "heat-balance";
pub const COV_WINDOW: usize = 50;
pub const RESIDUAL_POINTS: usize = 500_000;

pub const DEFAULT_RES_CRIT: f64 = 1e-4;
pub const DEFAULT_COV_CRIT: f64 = 1e-4;
pub const DEFAULT_CONV_CHECK_FREQ: usize = 5;
pub const DEFAULT_ITER_COUNT: usize = 500;
pub const DEFAULT_TIME_STEP_FACTOR: f64 = 5.0;

/// Scopes a structured report may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    Surface,
    Volume,
    Force,
    Drag,
    Lift,
    Moment,
    Flux,
}

impl ReportScope {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name.trim().to_lowercase().as_str() {
            "surface" => Self::Surface,
            "volume" => Self::Volume,
            "force" => Self::Force,
            "drag" => Self::Drag,
            "lift" => Self::Lift,
            "moment" => Self::Moment,
            "flux" => Self::Flux,
            _ => return None,
        })
    }

    pub fn segment(&self) -> &'static str {
        match self {
            Self::Surface => "surface",
            Self::Volume => "volume",
            Self::Force => "force",
            Self::Drag => "drag",
            Self::Lift => "lift",
            Self::Moment => "moment",
            Self::Flux => "flux",
        }
    }

    /// Field of the report holding its zone list.
    fn zone_field(&self) -> &'static str {
        match self {
            Self::Surface => "surface_names",
            Self::Volume => "cell_zones",
            Self::Flux => "boundaries",
            _ => "zones",
        }
    }

    fn takes_cell_zones(&self) -> bool {
        matches!(self, Self::Volume)
    }

    fn has_report_type(&self) -> bool {
        matches!(self, Self::Surface | Self::Volume | Self::Flux)
    }

    fn has_field(&self) -> bool {
        matches!(self, Self::Surface | Self::Volume)
    }
}

/// Everything the reports stage created; later stages read the names back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportSummary {
    /// Solver report names in report-file order.
    pub reports: Vec<String>,
    pub cov_reports: Vec<String>,
    pub report_file: Option<String>,
}

/// Solver name of a CoV report.
pub fn cov_report_name(report: &str) -> String {
    format!("{report}-cov")
}

fn definition_path(scope: &str, name: &str) -> String {
    format!("{DEFINITIONS}/{scope}/{name}")
}

/// Report definitions for `reportlist` and `basic_reports`, plus the balance
/// reports and the report file.
pub fn apply(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<ReportSummary> {
    let mut summary = ReportSummary::default();
    expression_reports(ctx, &mut summary)?;
    basic_reports(ctx, &mut summary)?;
    balance_reports(ctx, energy)?;
    report_file(ctx, &mut summary)?;
    Ok(summary)
}

fn expression_reports(ctx: &mut StageContext<'_>, summary: &mut ReportSummary) -> SetupResult<()> {
    let key = "solution.reportlist";
    for expression in ctx.case.list_in("solution", "reportlist") {
        if !ctx.driver.exists(&format!("setup/named_expressions/{expression}")) {
            tracing::warn!(key, "expression '{expression}' is not defined, no report created");
            continue;
        }
        let name = report_name(&expression);
        let scope = "single_valued_expression";
        if !ctx.driver.try_create(&format!("{DEFINITIONS}/{scope}"), &name, key)? {
            continue;
        }
        let path = definition_path(scope, &name);
        ctx.driver
            .try_set(&format!("{path}/definition"), Value::from(expression.as_str()), key)?;
        ctx.driver
            .try_invoke(&format!("{path}/create_output_parameter"), Value::Null, key)?;
        report_plot(ctx, &name, key)?;
        summary.reports.push(name);
    }
    Ok(())
}

fn report_plot(ctx: &mut StageContext<'_>, report: &str, key: &str) -> SetupResult<()> {
    let plot = format!("{report}-plot");
    if ctx.driver.try_create(REPORT_PLOTS, &plot, key)? {
        ctx.driver
            .try_set(&format!("{REPORT_PLOTS}/{plot}/report_defs"), json!([report]), key)?;
        ctx.driver
            .try_set(&format!("{REPORT_PLOTS}/{plot}/print"), Value::from(true), key)?;
    }
    Ok(())
}

fn basic_reports(ctx: &mut StageContext<'_>, summary: &mut ReportSummary) -> SetupResult<()> {
    let Some(reports) = ctx.case.map_in("solution", "basic_reports") else {
        return Ok(());
    };
    let boundary: Vec<String> = ctx.driver.boundary_zones().into_iter().map(|(z, _)| z).collect();
    let cells = ctx.driver.cell_zones();

    for (name, spec) in reports {
        let key = format!("solution.basic_reports.{name}");
        let Some(spec) = spec.as_object() else {
            tracing::warn!(key = %key, "report definition must be a mapping");
            continue;
        };
        match basic_report(ctx, &name, spec, &boundary, &cells, &key)? {
            true => summary.reports.push(name),
            false => tracing::warn!(key = %key, "report '{name}' skipped"),
        }
    }
    Ok(())
}

fn basic_report(
    ctx: &mut StageContext<'_>,
    name: &str,
    spec: &Map<String, Value>,
    boundary: &[String],
    cells: &[String],
    key: &str,
) -> SetupResult<bool> {
    let scope_name = spec.get("scope").and_then(as_text).unwrap_or_default();
    let Some(scope) = ReportScope::parse(&scope_name) else {
        tracing::warn!(key, "unknown report scope '{scope_name}'");
        return Ok(false);
    };
    let zones = spec.get("zones").map(string_list).unwrap_or_default();
    let known = if scope.takes_cell_zones() { cells } else { boundary };
    if let Some(missing) = zones.iter().find(|z| !known.contains(z)) {
        tracing::warn!(key, "zone '{missing}' does not exist");
        return Ok(false);
    }

    let container = format!("{DEFINITIONS}/{}", scope.segment());
    let path = definition_path(scope.segment(), name);
    let report_type = spec.get("type").and_then(as_text);
    if scope.has_report_type() {
        if let Some(t) = &report_type {
            if !ctx.driver.is_allowed(&format!("{path}/report_type"), t) {
                tracing::warn!(key, "report type '{t}' is not supported");
                return Ok(false);
            }
        }
    }
    let variable = spec.get("variable").and_then(as_text);
    if scope.has_field() {
        if let Some(v) = &variable {
            if !ctx.driver.is_allowed(&format!("{path}/field"), v) {
                tracing::warn!(key, "field variable '{v}' is not available");
                return Ok(false);
            }
        }
    }

    if !ctx.driver.try_create(&container, name, key)? {
        return Ok(false);
    }
    if let (true, Some(t)) = (scope.has_report_type(), report_type) {
        ctx.driver.set_enum(&format!("{path}/report_type"), &t, key)?;
    }
    if let (true, Some(v)) = (scope.has_field(), variable) {
        ctx.driver.set_enum(&format!("{path}/field"), &v, key)?;
    }
    ctx.driver
        .try_set(&format!("{path}/{}", scope.zone_field()), json!(zones), key)?;
    if let Some(per_zone) = spec.get("per_zone").and_then(as_bool) {
        let field = match scope {
            ReportScope::Surface => "per_surface",
            _ => "per_zone",
        };
        ctx.driver
            .try_set(&format!("{path}/{field}"), Value::from(per_zone), key)?;
    }
    if let Some(output) = spec.get("report_output_type").and_then(as_text) {
        ctx.driver
            .try_set(&format!("{path}/report_output_type"), Value::from(output), key)?;
    }
    match scope {
        ReportScope::Force | ReportScope::Drag | ReportScope::Lift => {
            if let Some(v) = spec.get("force_vector").and_then(f64_list) {
                ctx.driver
                    .try_set(&format!("{path}/force_vector"), json!(v), key)?;
            }
        }
        ReportScope::Moment => {
            for field in ["mom_center", "mom_axis"] {
                if let Some(v) = spec.get(field).and_then(f64_list) {
                    ctx.driver.try_set(&format!("{path}/{field}"), json!(v), key)?;
                }
            }
        }
        _ => {}
    }
    ctx.driver
        .try_invoke(&format!("{path}/create_output_parameter"), Value::Null, key)?;
    report_plot(ctx, name, key)?;
    Ok(true)
}

/// Mass (and with energy, heat) balance over all inlets and outlets.
fn balance_reports(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    let mut zones = ctx.case.location_list("bz_inlet_names");
    zones.extend(ctx.case.location_list("bz_outlet_names"));
    if zones.is_empty() {
        return Ok(());
    }
    let mut balances = vec![(MASS_BALANCE_REPORT, "flux-massflow")];
    if energy {
        balances.push((HEAT_BALANCE_REPORT, "flux-heattransfer"));
    }
    let container = format!("{DEFINITIONS}/flux");
    for (name, kind) in balances {
        let key = "locations.bz_outlet_names";
        if !ctx.driver.try_create(&container, name, key)? {
            continue;
        }
        let path = definition_path("flux", name);
        ctx.driver.set_enum(&format!("{path}/report_type"), kind, key)?;
        ctx.driver
            .try_set(&format!("{path}/boundaries"), json!(zones), key)?;
        ctx.driver
            .try_set(&format!("{path}/per_zone"), Value::from(false), key)?;
    }
    Ok(())
}

fn report_file(ctx: &mut StageContext<'_>, summary: &mut ReportSummary) -> SetupResult<()> {
    if summary.reports.is_empty() {
        return Ok(());
    }
    let key = "solution.reportlist";
    let file_name = ctx
        .layout
        .solver_file(&format!("{}_report.out", ctx.case.filename()));
    if !ctx.driver.try_create(REPORT_FILES, REPORT_FILE, key)? {
        return Ok(());
    }
    let path = format!("{REPORT_FILES}/{REPORT_FILE}");
    ctx.driver
        .try_set(&format!("{path}/file_name"), Value::from(file_name.as_str()), key)?;
    ctx.driver
        .try_set(&format!("{path}/report_defs"), json!(summary.reports), key)?;
    ctx.driver
        .try_set(&format!("{path}/print"), Value::from(true), key)?;
    summary.report_file = Some(file_name);
    Ok(())
}

/// Residual monitor limits, scaling and the absolute criterion.
pub fn residuals(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let key = "solution.res_crit";
    let res_crit = ctx.case.f64_or("solution", "res_crit", DEFAULT_RES_CRIT);

    let options = format!("{RESIDUAL}/options");
    for (field, value) in [
        ("plot_points", json!(RESIDUAL_POINTS)),
        ("store_points", json!(RESIDUAL_POINTS)),
        ("scale_residuals", json!(true)),
        ("compute_local_scale", json!(true)),
        ("reporting_option", json!("local")),
    ] {
        ctx.driver.try_set(&format!("{options}/{field}"), value, key)?;
    }

    let equations = ctx.driver.children(&format!("{RESIDUAL}/equations"));
    if ctx.driver.supports(Feature::NamedResidualEquations) {
        for eq in &equations {
            let path = format!("{RESIDUAL}/equations/{eq}");
            ctx.driver
                .try_set(&format!("{path}/check_convergence"), Value::from(true), key)?;
            ctx.driver
                .try_set(&format!("{path}/absolute_criteria"), Value::from(res_crit), key)?;
        }
    } else {
        let criteria = vec![res_crit.to_string(); equations.len().max(1)].join(" ");
        ctx.driver.try_tui(
            &format!("/solve/monitors/residual/convergence-criteria {criteria}"),
            key,
        )?;
    }
    Ok(())
}

/// Coefficient-of-variation reports for `cov_list`.
pub fn cov_reports(ctx: &mut StageContext<'_>, summary: &mut ReportSummary) -> SetupResult<()> {
    let key = "solution.cov_list";
    let cov_list = ctx.case.list_in("solution", "cov_list");
    if cov_list.is_empty() {
        return Ok(());
    }
    if !ctx.driver.supports(Feature::CovReports) {
        tracing::warn!(key, "CoV reports are not available on GPU, skipped");
        return Ok(());
    }
    let cov_crit = ctx.case.f64_or("solution", "cov_crit", DEFAULT_COV_CRIT);
    let container = format!("{CONVERGENCE}/convergence_reports");

    for entry in cov_list {
        // entries name an expression or a structured report
        let report = if summary.reports.contains(&entry) {
            entry.clone()
        } else {
            report_name(&entry)
        };
        if !summary.reports.contains(&report) {
            tracing::warn!(key, "'{entry}' has no report definition, no CoV created");
            continue;
        }
        let name = cov_report_name(&report);
        if !ctx.driver.try_create(&container, &name, key)? {
            continue;
        }
        let path = format!("{container}/{name}");
        for (field, value) in [
            ("report_defs", json!(report)),
            ("previous_values_to_consider", json!(COV_WINDOW)),
            ("stop_criterion", json!(cov_crit)),
            ("print", json!(true)),
            ("plot", json!(true)),
            ("active", json!(true)),
        ] {
            ctx.driver.try_set(&format!("{path}/{field}"), value, key)?;
        }
        summary.cov_reports.push(name);
    }
    Ok(())
}

pub fn convergence_condition(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let key = "solution.conv_check_freq";
    let frequency = ctx
        .case
        .usize_or("solution", "conv_check_freq", DEFAULT_CONV_CHECK_FREQ);
    ctx.driver.set_enum(
        &format!("{CONVERGENCE}/condition"),
        "all-conditions-are-met",
        key,
    )?;
    ctx.driver
        .try_set(&format!("{CONVERGENCE}/frequency"), Value::from(frequency), key)?;
    Ok(())
}

/// Iteration count and pseudo-time-step controls.
pub fn run_calculation(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let iter_count = ctx
        .case
        .usize_or("solution", "iter_count", DEFAULT_ITER_COUNT);
    ctx.driver.try_set(
        &format!("{RUN_CALCULATION}/iter_count"),
        Value::from(iter_count),
        "solution.iter_count",
    )?;
    if !ctx.driver.supports(Feature::PseudoTimeStep) {
        return Ok(());
    }

    let base = format!("{RUN_CALCULATION}/pseudo_time_settings/time_step_method");
    if let Some(step) = ctx.case.f64_in("solution", "pseudo_timestep") {
        let key = "solution.pseudo_timestep";
        if ctx
            .driver
            .set_enum(&format!("{base}/time_step_method"), "user-specified", key)?
        {
            ctx.driver
                .try_set(&format!("{base}/pseudo_time_step_size"), Value::from(step), key)?;
        }
        return Ok(());
    }

    let key = "solution.time_step_factor";
    let factor = ctx
        .case
        .f64_or("solution", "time_step_factor", DEFAULT_TIME_STEP_FACTOR);
    let method = ctx
        .case
        .text_or("solution", "time_step_method", "conservative");
    if ctx
        .driver
        .set_enum(&format!("{base}/time_step_method"), "automatic", key)?
    {
        ctx.driver.set_enum(
            &format!("{base}/length_scale_methods"),
            &method,
            "solution.time_step_method",
        )?;
        ctx.driver.try_set(
            &format!("{base}/time_step_size_scale_factor"),
            Value::from(factor),
            key,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_parse_case_insensitively() {
        assert_eq!(ReportScope::parse("Surface"), Some(ReportScope::Surface));
        assert_eq!(ReportScope::parse("flux"), Some(ReportScope::Flux));
        assert_eq!(ReportScope::parse("expression"), None);
        assert_eq!(ReportScope::Volume.zone_field(), "cell_zones");
    }

    #[test]
    fn cov_names_follow_reports() {
        assert_eq!(cov_report_name("rep-mp-prt"), "rep-mp-prt-cov");
    }
}
