//! Report files written by the solver's report-file monitor.
//!
//! Layout: the monitor name, a line of quoted column names, the same names in
//! parentheses, then one whitespace-separated row per iteration.

use crate::{ResultsError, ResultsResult};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tw_driver::MonitorData;

static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("quoted token pattern"));

/// Header lines before the column names.
const HEADER_LINES: usize = 2;

fn quoted_tokens(line: &str) -> Vec<String> {
    QUOTED
        .captures_iter(line)
        .map(|c| c[1].to_string())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFile {
    pub name: String,
    /// First column is the iteration.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl ReportFile {
    pub fn parse(text: &str, source: &str) -> ResultsResult<Self> {
        let lines: Vec<&str> = text.lines().collect();
        let parse_error = |line: usize, message: String| ResultsError::Parse {
            path: source.to_string(),
            line,
            message,
        };
        if lines.len() <= HEADER_LINES {
            return Err(parse_error(lines.len(), "missing column header".to_string()));
        }
        let name = quoted_tokens(lines[0])
            .into_iter()
            .next()
            .unwrap_or_else(|| lines[0].trim().to_string());
        let mut columns = quoted_tokens(lines[HEADER_LINES]);
        if columns.is_empty() {
            columns = quoted_tokens(lines[1]);
        }
        if columns.is_empty() {
            return Err(parse_error(HEADER_LINES + 1, "no column names".to_string()));
        }

        let mut rows = Vec::new();
        for (index, line) in lines.iter().enumerate().skip(HEADER_LINES + 1) {
            if line.trim().is_empty() {
                continue;
            }
            let row = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| parse_error(index + 1, e.to_string()))?;
            if row.len() != columns.len() {
                return Err(parse_error(
                    index + 1,
                    format!("expected {} values, found {}", columns.len(), row.len()),
                ));
            }
            rows.push(row);
        }
        Ok(Self {
            name,
            columns,
            rows,
        })
    }

    pub fn read(path: &Path) -> ResultsResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text, &path.display().to_string())
    }

    /// Report columns, without the iteration.
    pub fn report_names(&self) -> &[String] {
        self.columns.get(1..).unwrap_or_default()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[index]).collect())
    }

    pub fn iterations(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r[0]).collect()
    }
}

impl From<MonitorData> for ReportFile {
    fn from(data: MonitorData) -> Self {
        Self {
            name: String::new(),
            columns: data.columns,
            rows: data.rows,
        }
    }
}

/// The newest `<stem>.out` / `<stem>_<n>.out` in `dir`: the highest suffix wins.
pub fn latest_report_file(dir: &Path, stem: &str) -> Option<PathBuf> {
    let pattern = Regex::new(&format!(r"^{}(?:_(\d+))?\.out$", regex::escape(stem))).ok()?;
    let entries = fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let caps = pattern.captures(&name)?;
            let suffix = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u64>().ok())
                .unwrap_or(0);
            Some((suffix, entry.path()))
        })
        .max_by_key(|(suffix, _)| *suffix)
        .map(|(_, path)| path)
}

/// Any `.out` file in `dir`, for folders holding a single monitor.
pub fn find_report_file(dir: &Path) -> Option<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|e| e == "out"))
        .collect();
    files.sort();
    files.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\"report-file\"\n\"Iteration\" \"rep-mp-prt\"\n(\"Iteration\" \"rep-mp-prt\")\n1 1.3\n2 1.25\n3 1.2\n";

    #[test]
    fn parses_solver_layout() {
        let file = ReportFile::parse(SAMPLE, "sample").unwrap();
        assert_eq!(file.name, "report-file");
        assert_eq!(file.report_names(), ["rep-mp-prt".to_string()]);
        assert_eq!(file.column("rep-mp-prt").unwrap(), vec![1.3, 1.25, 1.2]);
        assert_eq!(file.iterations(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let text = format!("{SAMPLE}4\n");
        let err = ReportFile::parse(&text, "sample").unwrap_err();
        assert!(err.to_string().contains("sample:7"));
    }

    #[test]
    fn latest_file_uses_highest_suffix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["caseA_report.out", "caseA_report_2.out", "caseA_report_10.out", "caseB_report_99.out"] {
            fs::write(dir.path().join(name), SAMPLE).unwrap();
        }
        let latest = latest_report_file(dir.path(), "caseA_report").unwrap();
        assert!(latest.ends_with("caseA_report_10.out"));
        assert!(latest_report_file(dir.path(), "caseC_report").is_none());
    }
}
