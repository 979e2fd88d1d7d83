//! Study post-processing: per-design-point tables, charts and the operating map.

use crate::layout::StudyLayout;
use crate::StudyResult;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tw_config::StudyDef;
use tw_results::casetable::{cov_column, write_run_charts};
use tw_results::monitor::find_report_file;
use tw_results::{
    CaseTableInputs, Cell, Chart, CovClass, ReportFile, ROLLING_WINDOW, Series, Table,
    case_report_table, classify_cov, classify_cov_set, classify_residuals,
    scrape_transcript, summarize,
};
use tw_setup::report_name;

pub const RESIDUAL_CSV: &str = "Auto-generated-residuals-data-static.csv";
pub const DESIGN_POINT_COLUMN: &str = "Design Point";
pub const COV_CLASS_COLUMN: &str = "CoV Convergence";
pub const RESIDUAL_CLASS_COLUMN: &str = "Residual Convergence";
pub const CONVERGENCE_COLUMN: &str = "convergence";

/// Normalized column names tried in order when no x axis is configured.
const X_AXIS_FALLBACKS: [&str; 2] = ["volumeflow", "massflow"];

#[derive(Debug, Clone, PartialEq)]
pub struct StudyPostOutcome {
    pub plot_table: PathBuf,
    pub design_points: usize,
    pub converged: usize,
    pub wall_clock_total: f64,
    pub x_axis: Option<String>,
}

struct Snapshot {
    solver_study: Option<String>,
    project: Option<PathBuf>,
    cov_reports: Vec<String>,
}

fn read_snapshot(layout: &StudyLayout) -> Snapshot {
    let value: Value = fs::read_to_string(layout.temp_data())
        .ok()
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null);
    Snapshot {
        solver_study: value
            .get("solver_study")
            .and_then(Value::as_str)
            .map(str::to_string),
        project: value
            .get("project")
            .and_then(Value::as_str)
            .map(PathBuf::from),
        cov_reports: value
            .get("convergence_reports")
            .and_then(Value::as_object)
            .map(|reports| {
                reports
                    .keys()
                    .map(|k| k.strip_suffix("-cov").unwrap_or(k).to_string())
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// `dp<N>` folders sorted by N.
fn design_point_dirs(database: &Path) -> Vec<(usize, PathBuf)> {
    let Ok(entries) = fs::read_dir(database) else {
        return Vec::new();
    };
    let mut dirs: Vec<(usize, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            let index = name.strip_prefix("dp")?.parse().ok()?;
            Some((index, e.path()))
        })
        .collect();
    dirs.sort_by_key(|(index, _)| *index);
    dirs
}

/// Final residuals from the residual history CSV, without the iteration.
fn final_residuals(path: &Path) -> StudyResult<Vec<(String, f64)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let table = Table::read_csv(path)?;
    let Some(last) = table.rows.last() else {
        return Ok(Vec::new());
    };
    Ok(table
        .columns
        .iter()
        .zip(last)
        .skip(1)
        .filter_map(|(name, cell)| cell.as_f64().map(|v| (name.clone(), v)))
        .collect())
}

fn normalized(column: &str) -> String {
    column
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// The configured x axis, else the first volume-flow then mass-flow column.
pub fn pick_x_axis(table: &Table, configured: Option<&str>) -> Option<String> {
    if let Some(column) = configured.filter(|c| table.column_index(c).is_some()) {
        return Some(column.to_string());
    }
    X_AXIS_FALLBACKS.iter().find_map(|needle| {
        table
            .columns
            .iter()
            .find(|c| !c.ends_with("-cov") && normalized(c).contains(needle))
            .cloned()
    })
}

fn sort_by_column(table: &mut Table, column: &str) {
    let Some(index) = table.column_index(column) else {
        return;
    };
    table.rows.sort_by(|a, b| {
        let key = |row: &Vec<Cell>| row[index].as_f64().unwrap_or(f64::INFINITY);
        key(a).total_cmp(&key(b))
    });
}

/// Join design-table inputs and outputs onto `table` by design-point name.
fn join_design_table(table: &mut Table, dp_table: &Table) {
    let Some(dp_index) = dp_table.column_index(DESIGN_POINT_COLUMN) else {
        return;
    };
    let names: Vec<String> = table
        .rows
        .iter()
        .map(|r| r[0].to_string())
        .collect();
    for column in &dp_table.columns {
        if column == DESIGN_POINT_COLUMN || table.column_index(column).is_some() {
            continue;
        }
        let Some(source) = dp_table.column_index(column) else {
            continue;
        };
        let values = names
            .iter()
            .map(|name| {
                dp_table
                    .rows
                    .iter()
                    .find(|r| r[dp_index].to_string() == *name)
                    .map(|r| r[source].clone())
                    .unwrap_or_default()
            })
            .collect();
        table.add_column(column, values);
    }
}

pub fn post_process(
    layout: &StudyLayout,
    def: &StudyDef,
    plot: bool,
) -> StudyResult<Option<StudyPostOutcome>> {
    let key = format!("studies.{}", layout.name());
    let snapshot = read_snapshot(layout);
    let database = snapshot
        .project
        .as_deref()
        .map(|p| p.with_extension("cffdb"))
        .unwrap_or_else(|| layout.database());
    let study_db = snapshot
        .solver_study
        .as_deref()
        .map(|s| database.join(s))
        .filter(|p| p.is_dir())
        .or_else(|| {
            // a single study in the database needs no snapshot
            fs::read_dir(&database)
                .ok()?
                .filter_map(Result::ok)
                .map(|e| e.path())
                .find(|p| p.is_dir())
        });
    let Some(study_db) = study_db else {
        warn!(key = %key, "no design-point results under {}", database.display());
        return Ok(None);
    };

    let dp_table = if layout.dp_table().exists() {
        Some(Table::read_csv(&layout.dp_table())?)
    } else {
        None
    };
    let cov_reports: Vec<String> = if def.cov_list.is_empty() {
        snapshot.cov_reports
    } else {
        def.cov_list
            .iter()
            .map(|c| if c.starts_with("rep-") { c.clone() } else { report_name(c) })
            .collect()
    };

    let mut rows = Vec::new();
    let mut residuals = Vec::new();
    let mut wall_clock_total = 0.0;
    for (index, dir) in design_point_dirs(&study_db) {
        let name = dp_table
            .as_ref()
            .and_then(|t| t.get(index, DESIGN_POINT_COLUMN))
            .map(Cell::to_string)
            .unwrap_or_else(|| format!("DP{index}"));
        let monitors = match find_report_file(&dir) {
            Some(file) => summarize(&ReportFile::read(&file)?, ROLLING_WINDOW),
            None => {
                warn!(key = %key, "design point {name} has no report file");
                Vec::new()
            }
        };
        let mut transcript = fs::read_to_string(dir.join("solution.trn"))
            .map(|text| scrape_transcript(&text))
            .unwrap_or_default();
        let from_csv = final_residuals(&dir.join(RESIDUAL_CSV))?;
        if !from_csv.is_empty() {
            transcript.final_residuals = from_csv;
        }
        wall_clock_total += transcript.wall_clock_s.unwrap_or(0.0);

        if plot {
            write_run_charts(&layout.plots_dir(&name), &monitors, &cov_reports, Some(&transcript))?;
        }
        residuals.push(transcript.residual_values());
        rows.push(case_report_table(&CaseTableInputs {
            name: &name,
            name_column: DESIGN_POINT_COLUMN,
            monitors: &monitors,
            transcript: Some(&transcript),
            ..Default::default()
        }));
    }
    if rows.is_empty() {
        warn!(key = %key, "no design points found in {}", study_db.display());
        return Ok(None);
    }

    let mut table = Table::concat(&rows);
    let (mut cov_classes, mut residual_classes, mut verdicts) = (Vec::new(), Vec::new(), Vec::new());
    let mut converged = 0;
    for (row, values) in residuals.iter().enumerate() {
        let covs: Vec<f64> = if cov_reports.is_empty() {
            table
                .columns
                .iter()
                .filter(|c| c.ends_with("-cov"))
                .map(|c| table.number(row, c).unwrap_or(f64::NAN))
                .collect()
        } else {
            cov_reports
                .iter()
                .map(|r| table.number(row, &cov_column(r)).unwrap_or(f64::NAN))
                .collect()
        };
        let cov_class = classify_cov_set(&covs, def.cov_crit);
        let residual_class = classify_residuals(values, def.cov_crit);
        let ok = tw_results::convergence::is_converged(cov_class, residual_class);
        converged += usize::from(ok);
        cov_classes.push(Cell::from(cov_class.as_str()));
        residual_classes.push(Cell::from(residual_class.as_str()));
        verdicts.push(Cell::from(if ok { "converged" } else { "not converged" }));
    }
    table.add_column(COV_CLASS_COLUMN, cov_classes);
    table.add_column(RESIDUAL_CLASS_COLUMN, residual_classes);
    table.add_column(CONVERGENCE_COLUMN, verdicts);
    if let Some(dp_table) = &dp_table {
        join_design_table(&mut table, dp_table);
    }

    let x_axis = pick_x_axis(&table, def.plot_x_axis.as_deref());
    if let Some(x) = &x_axis {
        sort_by_column(&mut table, x);
    }
    table.write_csv(&layout.plot_table())?;

    if plot {
        write_operating_maps(layout, &table, x_axis.as_deref(), def.cov_crit, &cov_reports)?;
    }
    info!(
        study = layout.name(),
        design_points = table.rows.len(),
        converged,
        wall_clock_total,
        "study post-processing done"
    );
    Ok(Some(StudyPostOutcome {
        plot_table: layout.plot_table(),
        design_points: table.rows.len(),
        converged,
        wall_clock_total,
        x_axis,
    }))
}

/// One traffic-light chart per monitored report against the x axis.
fn write_operating_maps(
    layout: &StudyLayout,
    table: &Table,
    x_axis: Option<&str>,
    cov_crit: f64,
    cov_reports: &[String],
) -> StudyResult<Vec<PathBuf>> {
    let x_label = x_axis.unwrap_or(DESIGN_POINT_COLUMN);
    let xs: Vec<f64> = match x_axis {
        Some(x) => table.numbers(x).into_iter().map(|v| v.unwrap_or(f64::NAN)).collect(),
        None => (0..table.rows.len()).map(|i| i as f64).collect(),
    };
    let reports: Vec<&String> = table
        .columns
        .iter()
        .filter(|c| c.starts_with("rep-") && !c.ends_with("-cov"))
        .filter(|c| table.column_index(&cov_column(c)).is_some())
        .collect();

    let mut written = Vec::new();
    for report in reports {
        let ys = table.numbers(report);
        let mut series = Series::new(report.clone(), Vec::new());
        for (row, (x, y)) in xs.iter().zip(ys).enumerate() {
            let Some(y) = y else { continue };
            let class = if cov_reports.is_empty() || cov_reports.contains(report) {
                classify_cov(table.number(row, &cov_column(report)).unwrap_or(f64::NAN), cov_crit)
            } else {
                CovClass::Good
            };
            series.points.push((*x, y));
            series.colors.push(class.color().to_string());
        }
        let chart = Chart {
            markers: true,
            ..Chart::new(format!("{} {report}", layout.name()), x_label, report.clone())
                .with_series(series)
        };
        let path = layout.study_dir().join(format!("{report}_map.svg"));
        chart.write(&path)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: &[&str], rows: Vec<Vec<Cell>>) -> Table {
        let mut t = Table::new(columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            t.push_row(row);
        }
        t
    }

    #[test]
    fn x_axis_prefers_volume_flow() {
        let t = table(&["Design Point", "MP_MassFlow", "MP_Volume_Flow"], vec![]);
        assert_eq!(pick_x_axis(&t, None).as_deref(), Some("MP_Volume_Flow"));
        assert_eq!(pick_x_axis(&t, Some("MP_MassFlow")).as_deref(), Some("MP_MassFlow"));
        assert_eq!(pick_x_axis(&t, Some("missing")).as_deref(), Some("MP_Volume_Flow"));
        let t = table(&["Design Point", "rep-mp-massflow-cov"], vec![]);
        assert_eq!(pick_x_axis(&t, None), None);
    }

    #[test]
    fn sorting_puts_missing_values_last() {
        let mut t = table(
            &["Design Point", "q"],
            vec![
                vec!["DP1".into(), 3.0.into()],
                vec!["DP2".into(), Cell::Empty],
                vec!["DP3".into(), 1.0.into()],
            ],
        );
        sort_by_column(&mut t, "q");
        let order: Vec<String> = t.rows.iter().map(|r| r[0].to_string()).collect();
        assert_eq!(order, vec!["DP3", "DP1", "DP2"]);
    }

    #[test]
    fn design_table_columns_are_joined_by_name() {
        let mut t = table(&["Design Point", "rep-x"], vec![vec!["DP1".into(), 1.0.into()]]);
        let dp = table(
            &["Design Point", "BC_omega", "Status"],
            vec![
                vec!["Base DP".into(), 1000.0.into(), "Updated".into()],
                vec!["DP1".into(), 900.0.into(), "Updated".into()],
            ],
        );
        join_design_table(&mut t, &dp);
        assert_eq!(t.number(0, "BC_omega"), Some(900.0));
    }

    #[test]
    fn residual_csv_last_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(RESIDUAL_CSV);
        fs::write(&path, "Iteration,continuity,energy\n1,0.1,0.2\n2,1e-5,2e-5\n").unwrap();
        assert_eq!(
            final_residuals(&path).unwrap(),
            vec![("continuity".to_string(), 1e-5), ("energy".to_string(), 2e-5)]
        );
    }
}
