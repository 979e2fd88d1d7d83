//! Rolling statistics over monitor histories.

use crate::monitor::ReportFile;
use tw_core::{mean, sample_std};

/// Iterations in the rolling window.
pub const ROLLING_WINDOW: usize = 50;

fn windows(values: &[f64], window: usize) -> impl Iterator<Item = &[f64]> {
    let window = window.max(1);
    (0..values.len()).map(move |i| &values[(i + 1).saturating_sub(window)..=i])
}

/// Rolling mean; the first rows use whatever history exists.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    windows(values, window)
        .map(|w| mean(w).unwrap_or(f64::NAN))
        .collect()
}

/// Rolling coefficient of variation, `std / |mean|`. NaN until two samples
/// exist or while the mean is zero.
pub fn rolling_cov(values: &[f64], window: usize) -> Vec<f64> {
    windows(values, window)
        .map(|w| match (sample_std(w), mean(w)) {
            (Some(std), Some(m)) if m != 0.0 => std / m.abs(),
            _ => f64::NAN,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSummary {
    pub report: String,
    /// Last rolling mean.
    pub mean: f64,
    /// Last rolling CoV.
    pub cov: f64,
    pub iterations: Vec<f64>,
    pub rolling_mean: Vec<f64>,
    pub rolling_cov: Vec<f64>,
}

pub fn summarize(file: &ReportFile, window: usize) -> Vec<MonitorSummary> {
    let iterations = file.iterations();
    file.report_names()
        .iter()
        .filter_map(|report| {
            let values = file.column(report)?;
            let rolling_mean = rolling_mean(&values, window);
            let rolling_cov = rolling_cov(&values, window);
            Some(MonitorSummary {
                report: report.clone(),
                mean: rolling_mean.last().copied().unwrap_or(f64::NAN),
                cov: rolling_cov.last().copied().unwrap_or(f64::NAN),
                iterations: iterations.clone(),
                rolling_mean,
                rolling_cov,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_has_zero_cov() {
        let values = vec![2.0; 60];
        let cov = rolling_cov(&values, ROLLING_WINDOW);
        assert!(cov[0].is_nan());
        assert_eq!(cov[59], 0.0);
        assert_eq!(rolling_mean(&values, ROLLING_WINDOW)[59], 2.0);
    }

    #[test]
    fn window_drops_old_samples() {
        let values = [100.0, 1.0, 1.0, 1.0];
        let means = rolling_mean(&values, 3);
        assert_eq!(means[0], 100.0);
        assert_eq!(means[3], 1.0);
    }

    #[test]
    fn cov_uses_magnitude_of_mean() {
        let cov = rolling_cov(&[-1.0, -3.0], 50);
        assert!((cov[1] - 2.0_f64.sqrt() / 2.0).abs() < 1e-12);
    }
}
