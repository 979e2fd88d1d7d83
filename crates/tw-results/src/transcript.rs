//! Scrape a solver transcript for timing and the final residuals.

use regex::Regex;
use std::sync::LazyLock;

static WALL_CLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Total wall-clock time:\s*([-+0-9.eE]+)\s*sec").expect("wall-clock pattern")
});
static TIMER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Performance Timer for (\d+) iterations on (\d+) compute nodes")
        .expect("timer pattern")
});
static RESIDUAL_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*iter\s+(.*?)\s*time/iter\s*$").expect("header pattern"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptSummary {
    /// Summed over every timer block in the transcript.
    pub wall_clock_s: Option<f64>,
    pub compute_nodes: Option<usize>,
    pub iterations: Option<usize>,
    /// Equation name and value from the last residual row.
    pub final_residuals: Vec<(String, f64)>,
    /// Residual rows by iteration, since the equation set last changed.
    pub residual_history: Vec<(usize, Vec<f64>)>,
}

impl TranscriptSummary {
    pub fn residual_values(&self) -> Vec<f64> {
        self.final_residuals.iter().map(|(_, v)| *v).collect()
    }
}

fn residual_row(line: &str, equations: usize) -> Option<(usize, Vec<f64>)> {
    let mut tokens = line.split_whitespace();
    let iteration = tokens.next()?.parse::<usize>().ok()?;
    let values = tokens
        .take(equations)
        .map(|t| t.parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()?;
    (values.len() == equations).then_some((iteration, values))
}

pub fn scrape_transcript(text: &str) -> TranscriptSummary {
    let mut summary = TranscriptSummary::default();
    let mut equations: Vec<String> = Vec::new();
    let mut history: Vec<(usize, Vec<f64>)> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = WALL_CLOCK.captures(line) {
            if let Ok(seconds) = caps[1].parse::<f64>() {
                *summary.wall_clock_s.get_or_insert(0.0) += seconds;
            }
            continue;
        }
        if let Some(caps) = TIMER.captures(line) {
            summary.compute_nodes = caps[2].parse().ok();
            continue;
        }
        if let Some(caps) = RESIDUAL_HEADER.captures(line) {
            let header: Vec<String> = caps[1].split_whitespace().map(str::to_string).collect();
            if header != equations {
                history.clear();
                equations = header;
            }
            continue;
        }
        if !equations.is_empty()
            && let Some(row) = residual_row(line, equations.len())
        {
            history.push(row);
        }
    }

    if let Some((iteration, values)) = history.last() {
        summary.iterations = Some(*iteration);
        summary.final_residuals = equations.iter().cloned().zip(values.iter().copied()).collect();
    }
    summary.residual_history = history;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRANSCRIPT: &str = "\
> solve/iterate 2
  iter  continuity  x-velocity     time/iter
     1  1.0000e-01  2.0000e-02  0:00:00     1
     2  5.0000e-05  3.0000e-05  0:00:00     0

Performance Timer for 2 iterations on 4 compute nodes
  Average wall-clock time per iteration:          0.100 sec

  Total wall-clock time:                          0.200 sec
";

    #[test]
    fn reads_timer_and_last_residuals() {
        let summary = scrape_transcript(TRANSCRIPT);
        assert_eq!(summary.compute_nodes, Some(4));
        assert_eq!(summary.iterations, Some(2));
        assert!((summary.wall_clock_s.unwrap() - 0.2).abs() < 1e-12);
        assert_eq!(summary.residual_history.len(), 2);
        assert_eq!(
            summary.final_residuals,
            vec![("continuity".to_string(), 5e-5), ("x-velocity".to_string(), 3e-5)]
        );
    }

    #[test]
    fn restarted_runs_sum_wall_clock() {
        let text = format!("{TRANSCRIPT}{TRANSCRIPT}");
        let summary = scrape_transcript(&text);
        assert!((summary.wall_clock_s.unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn empty_transcript_has_nothing() {
        assert_eq!(scrape_transcript(""), TranscriptSummary::default());
    }
}
