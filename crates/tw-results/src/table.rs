//! Column-labelled tables persisted as CSV.

use crate::{ResultsError, ResultsResult};
use std::fmt::{self, Write as _};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cell {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            Cell::Text(s) => s.trim().parse().ok(),
            Cell::Empty => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    fn parse(raw: &str) -> Self {
        if raw.is_empty() {
            Cell::Empty
        } else if let Ok(v) = raw.parse::<f64>() {
            Cell::Number(v)
        } else {
            Cell::Text(raw.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(v) if v.is_nan() => Ok(()),
            Cell::Number(v) => write!(f, "{v}"),
            Cell::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Empty, Cell::Number)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Rows shorter than the header are padded with empty cells.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    pub fn number(&self, row: usize, column: &str) -> Option<f64> {
        self.get(row, column)?.as_f64()
    }

    pub fn numbers(&self, column: &str) -> Vec<Option<f64>> {
        let Some(index) = self.column_index(column) else {
            return vec![None; self.rows.len()];
        };
        self.rows.iter().map(|r| r[index].as_f64()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a column, filling existing rows from `values`.
    pub fn add_column(&mut self, name: &str, values: Vec<Cell>) {
        self.columns.push(name.to_string());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }

    /// Stack tables; columns are the union in first-seen order.
    pub fn concat<'a>(tables: impl IntoIterator<Item = &'a Table>) -> Table {
        let tables: Vec<&Table> = tables.into_iter().collect();
        let mut columns: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !columns.contains(column) {
                    columns.push(column.clone());
                }
            }
        }
        let mut merged = Table::new(columns);
        for table in tables {
            for row in &table.rows {
                let cells = merged
                    .columns
                    .iter()
                    .map(|c| {
                        table
                            .column_index(c)
                            .and_then(|i| row.get(i).cloned())
                            .unwrap_or_default()
                    })
                    .collect();
                merged.rows.push(cells);
            }
        }
        merged
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| escape(c)).collect();
        let _ = writeln!(out, "{}", header.join(","));
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(|c| escape(&c.to_string())).collect();
            let _ = writeln!(out, "{}", cells.join(","));
        }
        out
    }

    pub fn write_csv(&self, path: &Path) -> ResultsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_csv())?;
        Ok(())
    }

    pub fn parse_csv(text: &str, source: &str) -> ResultsResult<Table> {
        let mut records = text
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(n, l)| {
                split_record(l).ok_or_else(|| ResultsError::Parse {
                    path: source.to_string(),
                    line: n + 1,
                    message: "unterminated quote".to_string(),
                })
            });
        let Some(header) = records.next() else {
            return Ok(Table::default());
        };
        let mut table = Table::new(header?);
        for record in records {
            table.push_row(record?.iter().map(|raw| Cell::parse(raw)).collect());
        }
        Ok(table)
    }

    pub fn read_csv(path: &Path) -> ResultsResult<Table> {
        let text = fs::read_to_string(path)?;
        Self::parse_csv(&text, &path.display().to_string())
    }
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn split_record(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if quoted {
        return None;
    }
    fields.push(field);
    Some(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_unions_columns() {
        let mut a = Table::new(vec!["Case".into(), "rep-a".into()]);
        a.push_row(vec!["caseA".into(), 1.0.into()]);
        let mut b = Table::new(vec!["Case".into(), "rep-b".into()]);
        b.push_row(vec!["caseB".into(), 2.0.into()]);

        let merged = Table::concat([&a, &b]);
        assert_eq!(merged.columns, vec!["Case", "rep-a", "rep-b"]);
        assert_eq!(merged.number(0, "rep-a"), Some(1.0));
        assert_eq!(merged.number(0, "rep-b"), None);
        assert_eq!(merged.number(1, "rep-b"), Some(2.0));
    }

    #[test]
    fn quoted_fields_survive_csv() {
        let mut t = Table::new(vec!["Design Point".into(), "Status".into()]);
        t.push_row(vec!["DP 1".into(), "Updated, \"ok\"".into()]);
        let parsed = Table::parse_csv(&t.to_csv(), "t").unwrap();
        assert_eq!(parsed.get(0, "Status").and_then(Cell::as_text), Some("Updated, \"ok\""));
    }

    #[test]
    fn nan_writes_an_empty_cell() {
        let mut t = Table::new(vec!["x".into(), "y".into()]);
        t.push_row(vec![f64::NAN.into(), 2.5.into()]);
        assert_eq!(t.to_csv(), "x,y\n,2.5\n");
    }
}
