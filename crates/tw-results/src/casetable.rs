//! The single-row report table of a case and its charts.

use crate::chart::{Chart, Series};
use crate::stats::MonitorSummary;
use crate::table::{Cell, Table};
use crate::transcript::TranscriptSummary;
use crate::ResultsResult;
use std::path::{Path, PathBuf};

pub const MASS_BALANCE_COLUMN: &str = "Mass Balance [kg/s]";
pub const HEAT_BALANCE_COLUMN: &str = "Heat Balance [W]";
pub const WALL_CLOCK_COLUMN: &str = "Total Wall Clock Time";
pub const COMPUTE_NODES_COLUMN: &str = "Compute Nodes";

pub fn cov_column(report: &str) -> String {
    format!("{report}-cov")
}

#[derive(Debug, Clone, Default)]
pub struct CaseTableInputs<'a> {
    /// Value of the first column; the case name, or a design point.
    pub name: &'a str,
    pub name_column: &'a str,
    pub pseudo_time_step: Option<f64>,
    pub monitors: &'a [MonitorSummary],
    pub mass_balance: Option<f64>,
    /// Only present when energy is solved.
    pub heat_balance: Option<f64>,
    pub transcript: Option<&'a TranscriptSummary>,
}

pub fn case_report_table(inputs: &CaseTableInputs<'_>) -> Table {
    let name_column = if inputs.name_column.is_empty() {
        "Case"
    } else {
        inputs.name_column
    };
    let mut columns = vec![name_column.to_string(), "Pseudo Time Step".to_string()];
    let mut row: Vec<Cell> = vec![inputs.name.into(), inputs.pseudo_time_step.into()];

    for monitor in inputs.monitors {
        columns.push(monitor.report.clone());
        row.push(monitor.mean.into());
    }
    for monitor in inputs.monitors {
        columns.push(cov_column(&monitor.report));
        row.push(monitor.cov.into());
    }

    columns.push(MASS_BALANCE_COLUMN.to_string());
    row.push(inputs.mass_balance.into());
    if let Some(heat) = inputs.heat_balance {
        columns.push(HEAT_BALANCE_COLUMN.to_string());
        row.push(heat.into());
    }

    if let Some(transcript) = inputs.transcript {
        columns.push(WALL_CLOCK_COLUMN.to_string());
        row.push(transcript.wall_clock_s.into());
        columns.push(COMPUTE_NODES_COLUMN.to_string());
        row.push(transcript.compute_nodes.map(|n| n as f64).into());
        for (equation, value) in &transcript.final_residuals {
            columns.push(equation.clone());
            row.push((*value).into());
        }
    }

    let mut table = Table::new(columns);
    table.push_row(row);
    table
}

/// Monitor, CoV and residual charts of one run. CoV curves are limited to
/// `cov_reports`. Returns the written files.
pub fn write_run_charts(
    dir: &Path,
    monitors: &[MonitorSummary],
    cov_reports: &[String],
    transcript: Option<&TranscriptSummary>,
) -> ResultsResult<Vec<PathBuf>> {
    let mut written = Vec::new();

    for monitor in monitors {
        let chart = Chart::new(&monitor.report, "Iteration", &monitor.report).with_series(
            Series::from_columns("rolling mean", &monitor.iterations, &monitor.rolling_mean),
        );
        let path = dir.join(format!("{}.svg", monitor.report));
        chart.write(&path)?;
        written.push(path);
    }

    let active: Vec<&MonitorSummary> = monitors
        .iter()
        .filter(|m| cov_reports.iter().any(|r| r == &m.report))
        .collect();
    if !active.is_empty() {
        let mut chart = Chart::new("CoV", "Iteration", "CoV");
        chart.log_y = true;
        for monitor in active {
            chart.series.push(Series::from_columns(
                cov_column(&monitor.report),
                &monitor.iterations,
                &monitor.rolling_cov,
            ));
        }
        let path = dir.join("cov.svg");
        chart.write(&path)?;
        written.push(path);
    }

    if let Some(transcript) = transcript.filter(|t| !t.residual_history.is_empty()) {
        let mut chart = Chart::new("Residuals", "Iteration", "residual");
        chart.log_y = true;
        for (index, (equation, _)) in transcript.final_residuals.iter().enumerate() {
            let points = transcript
                .residual_history
                .iter()
                .filter_map(|(it, values)| values.get(index).map(|v| (*it as f64, *v)))
                .collect();
            chart.series.push(Series::new(equation.clone(), points));
        }
        let path = dir.join("residuals.svg");
        chart.write(&path)?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::ReportFile;
    use crate::stats::{ROLLING_WINDOW, summarize};
    use crate::transcript::scrape_transcript;

    fn monitors() -> Vec<MonitorSummary> {
        let mut text = String::from("\"report-file\"\n\"Iteration\" \"rep-mp-prt\"\n(\"Iteration\" \"rep-mp-prt\")\n");
        for it in 1..=10 {
            text.push_str(&format!("{it} 1.5\n"));
        }
        summarize(&ReportFile::parse(&text, "t").unwrap(), ROLLING_WINDOW)
    }

    #[test]
    fn row_layout() {
        let monitors = monitors();
        let transcript = scrape_transcript(
            "  iter  continuity     time/iter\n     1  1.0000e-05  0:00:00     0\n\
             Performance Timer for 1 iterations on 2 compute nodes\n  Total wall-clock time:  3.5 sec\n",
        );
        let table = case_report_table(&CaseTableInputs {
            name: "caseA",
            pseudo_time_step: Some(1e-3),
            monitors: &monitors,
            mass_balance: Some(1e-6),
            transcript: Some(&transcript),
            ..Default::default()
        });
        assert_eq!(
            table.columns,
            vec![
                "Case",
                "Pseudo Time Step",
                "rep-mp-prt",
                "rep-mp-prt-cov",
                MASS_BALANCE_COLUMN,
                WALL_CLOCK_COLUMN,
                COMPUTE_NODES_COLUMN,
                "continuity"
            ]
        );
        assert_eq!(table.number(0, "rep-mp-prt"), Some(1.5));
        assert_eq!(table.number(0, "rep-mp-prt-cov"), Some(0.0));
        assert_eq!(table.number(0, COMPUTE_NODES_COLUMN), Some(2.0));
        assert_eq!(table.number(0, "continuity"), Some(1e-5));
    }

    #[test]
    fn heat_balance_only_with_energy() {
        let table = case_report_table(&CaseTableInputs {
            name: "caseA",
            heat_balance: Some(0.5),
            ..Default::default()
        });
        assert_eq!(table.number(0, HEAT_BALANCE_COLUMN), Some(0.5));
        assert!(table.column_index(WALL_CLOCK_COLUMN).is_none());
    }

    #[test]
    fn cov_chart_only_for_active_reports() {
        let dir = tempfile::tempdir().unwrap();
        let written = write_run_charts(dir.path(), &monitors(), &[], None).unwrap();
        assert_eq!(written.len(), 1);
        let written =
            write_run_charts(dir.path(), &monitors(), &["rep-mp-prt".to_string()], None).unwrap();
        assert!(written.iter().any(|p| p.ends_with("cov.svg")));
    }
}
