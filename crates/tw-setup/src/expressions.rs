//! Named expressions: fill the template, hand it to the solver, fix the
//! parameter flags and write the canonical table back out.

use crate::context::StageContext;
use crate::error::{SetupError, SetupResult};
use regex::Regex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;
use tw_config::Case;
use tw_config::tree::{as_text, string_list};
use tw_core::is_bare_number;
use tw_driver::Feature;

/// Template shipped with the wizard, used when a case names none.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/expressions_template.tsv");

pub const DEFAULT_EXPRESSION_FILE: &str = "expressions.tsv";

/// Efficiency expressions whose `Process` argument old solvers reject.
pub const EFFICIENCY_EXPRESSIONS: [&str; 2] =
    ["MP_Isentropic_Efficiency", "MP_Polytropic_Efficiency"];

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("placeholder pattern")
});

static PROCESS_ARGUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r",\s*Process\s*=\s*'[^']*'").expect("process argument pattern")
});

/// Zone list as the solver's expression language spells it: `'a','b'`.
pub fn format_list(zones: &[String]) -> String {
    zones
        .iter()
        .map(|z| format!("'{z}'"))
        .collect::<Vec<_>>()
        .join(",")
}

fn format_vector(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Placeholder names in `line`, in order of appearance.
pub fn placeholders(line: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(line)
        .map(|c| c[1].to_string())
        .collect()
}

/// Everything a template placeholder may refer to.
pub fn substitution_map(case: &mut Case) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for (name, definition) in case.expressions() {
        if let Some(text) = as_text(&definition).filter(|t| !t.trim().is_empty()) {
            values.insert(name, text);
        }
    }
    for (role, zones) in case.locations() {
        if zones.is_object() {
            continue;
        }
        let zones = string_list(&zones);
        if !zones.is_empty() {
            values.insert(role, format_list(&zones));
        }
    }
    if let Value::Object(props) = case.fluid_properties() {
        for (name, value) in props {
            if value.is_number() || value.is_string() {
                if let Some(text) = as_text(&value) {
                    values.insert(name, text);
                }
            }
        }
    }
    let origin = case.f64_list_or("setup", "rotation_axis_origin", &[0.0, 0.0, 0.0]);
    let direction = case.f64_list_or("setup", "rotation_axis_direction", &[0.0, 0.0, 1.0]);
    values.insert("rotation_axis_origin".to_string(), format_vector(&origin));
    values.insert("rotation_axis_direction".to_string(), format_vector(&direction));
    let ratio = case.text_or("setup", "efficiency_ratio", "TotalToTotal");
    values.insert("efficiency_ratio".to_string(), ratio);
    values
}

fn neutral_literal(placeholder: &str) -> &'static str {
    if placeholder == "GEO_NPSHa" { "0 [m]" } else { "1" }
}

/// Apply the row rules to a template and substitute every placeholder.
///
/// The header row is always kept. Rows whose placeholder cannot be resolved
/// are dropped (`"BC` rows, torque and Euler rows without their locations)
/// or neutralised (`"GEO` rows).
pub fn build_expressions(template: &str, values: &BTreeMap<String, String>) -> Vec<String> {
    let mut lines = template.lines().filter(|l| !l.trim().is_empty());
    let mut out: Vec<String> = lines.next().map(String::from).into_iter().collect();

    for line in lines {
        let first = line.split('\t').next().unwrap_or_default();
        let mut row = line.to_string();
        let missing: Vec<String> = placeholders(line)
            .into_iter()
            .filter(|p| !values.contains_key(p))
            .collect();

        if first.starts_with("\"BC") {
            if let Some(p) = missing.first() {
                tracing::debug!(key = %p, "dropping expression row {first}");
                continue;
            }
        } else if first.starts_with("\"GEO") {
            for p in &missing {
                row = row.replace(&format!("{{{p}}}"), neutral_literal(p));
            }
        } else if line.contains("Torque") && !values.contains_key("bz_walls_torque") {
            tracing::debug!(key = "locations.bz_walls_torque", "dropping expression row {first}");
            continue;
        } else if line.contains("Euler")
            && !(values.contains_key("bz_ep1_Euler") && values.contains_key("bz_ep2_Euler"))
        {
            tracing::debug!(key = "locations.bz_ep1_Euler", "dropping expression row {first}");
            continue;
        }

        let unresolved: Vec<String> = placeholders(&row)
            .into_iter()
            .filter(|p| !values.contains_key(p))
            .collect();
        if let Some(p) = unresolved.first() {
            tracing::warn!(key = %p, "no value for placeholder {{{p}}}, skipping row {first}");
            continue;
        }
        let substituted = PLACEHOLDER.replace_all(&row, |c: &regex::Captures<'_>| {
            values.get(&c[1]).cloned().unwrap_or_default()
        });
        out.push(substituted.into_owned());
    }
    out
}

/// Input-parameter rule for `BC_` expressions.
pub fn is_input_parameter(definition: &str, evaluates_to_number: bool) -> bool {
    evaluates_to_number && is_bare_number(definition)
}

/// Drop the `Process='...'` argument from an efficiency expression.
pub fn strip_process_argument(definition: &str) -> String {
    PROCESS_ARGUMENT.replace_all(definition, "").into_owned()
}

fn load_template(ctx: &StageContext<'_>) -> SetupResult<String> {
    match ctx.case.text("expressionTemplate") {
        Some(name) => {
            let path = ctx.layout.input(&name);
            fs::read_to_string(&path).map_err(|source| SetupError::Template {
                path: path.display().to_string(),
                source,
            })
        }
        None => Ok(DEFAULT_TEMPLATE.to_string()),
    }
}

/// Path of the canonical expression table of this case.
pub fn expression_file(ctx: &StageContext<'_>) -> PathBuf {
    let name = ctx
        .case
        .text("expressionFilename")
        .unwrap_or_else(|| DEFAULT_EXPRESSION_FILE.to_string());
    ctx.layout.file(&name)
}

/// Build, import, validate and re-export the expressions of a case.
pub fn apply(ctx: &mut StageContext<'_>) -> SetupResult<PathBuf> {
    let template = load_template(ctx)?;
    let values = substitution_map(ctx.case);
    let lines = build_expressions(&template, &values);
    let path = expression_file(ctx);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text)?;
    tracing::info!(
        case = ctx.case.name(),
        rows = lines.len().saturating_sub(1),
        "expression table written to {}",
        path.display()
    );

    let file_name = path.to_string_lossy().into_owned();
    if ctx
        .driver
        .try_invoke(
            "setup/named_expressions/import_from_tsv",
            json!({ "file_name": file_name }),
            "expressions",
        )?
        .is_none()
    {
        return Ok(path);
    }
    validate(ctx)?;
    ctx.driver.try_invoke(
        "setup/named_expressions/export_to_tsv",
        json!({ "file_name": file_name }),
        "expressionFilename",
    )?;
    Ok(path)
}

/// Fix input/output flags of the expressions the solver now holds.
pub fn validate(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let names = ctx.driver.children("setup/named_expressions");
    let reportlist = ctx.case.list_in("solution", "reportlist");
    let strip_process = !ctx.driver.supports(Feature::EfficiencyProcessArgument);

    for name in &names {
        let base = format!("setup/named_expressions/{name}");
        let key = format!("expressions.{name}");
        let definition = ctx
            .driver
            .get(&format!("{base}/definition"))
            .ok()
            .and_then(|v| as_text(&v))
            .unwrap_or_default();

        if name.starts_with("BC_") {
            let numeric = match ctx.driver.expression_value(name) {
                Ok(v) => v.is_number(),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(key = %key, "cannot evaluate: {e}");
                    false
                }
            };
            let input = is_input_parameter(&definition, numeric);
            if !input {
                tracing::info!(key = %key, "'{definition}' is not a plain value, not an input parameter");
            }
            ctx.driver
                .try_set(&format!("{base}/input_parameter"), Value::from(input), &key)?;
        }

        if reportlist.contains(name) {
            ctx.driver
                .try_set(&format!("{base}/output_parameter"), Value::from(true), &key)?;
        }

        if strip_process && EFFICIENCY_EXPRESSIONS.contains(&name.as_str()) {
            let rewritten = strip_process_argument(&definition);
            if rewritten != definition {
                ctx.driver
                    .try_set(&format!("{base}/definition"), Value::from(rewritten), &key)?;
            }
        }
    }

    for missing in reportlist.iter().filter(|r| !names.contains(r)) {
        tracing::warn!(key = "solution.reportlist", "report expression '{missing}' does not exist");
    }
    Ok(())
}
