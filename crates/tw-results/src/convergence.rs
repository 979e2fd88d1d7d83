//! Convergence verdicts from CoV values and final residuals.

use std::fmt;

/// Above `crit` but within this factor is still usable.
const OK_FACTOR: f64 = 5.0;
/// Slack on the criterion itself.
const GOOD_FACTOR: f64 = 1.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CovClass {
    Good,
    Ok,
    Poor,
}

impl CovClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CovClass::Good => "good",
            CovClass::Ok => "ok",
            CovClass::Poor => "poor",
        }
    }

    /// Traffic-light color for charts.
    pub fn color(&self) -> &'static str {
        match self {
            CovClass::Good => "green",
            CovClass::Ok => "yellow",
            CovClass::Poor => "red",
        }
    }
}

impl fmt::Display for CovClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// NaN (not enough history) counts as poor.
pub fn classify_cov(value: f64, crit: f64) -> CovClass {
    if value.is_nan() {
        CovClass::Poor
    } else if value <= crit * GOOD_FACTOR {
        CovClass::Good
    } else if value <= crit * OK_FACTOR {
        CovClass::Ok
    } else {
        CovClass::Poor
    }
}

/// The worst class over all values; an empty set is good.
pub fn classify_cov_set(values: &[f64], crit: f64) -> CovClass {
    values
        .iter()
        .map(|v| classify_cov(*v, crit))
        .max()
        .unwrap_or(CovClass::Good)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualClass {
    Converged,
    NotConverged,
}

impl ResidualClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResidualClass::Converged => "converged",
            ResidualClass::NotConverged => "not converged",
        }
    }
}

/// Converged when every final residual is below `crit`. No residuals at all
/// means nothing was solved.
pub fn classify_residuals(values: &[f64], crit: f64) -> ResidualClass {
    if !values.is_empty() && values.iter().all(|v| *v < crit) {
        ResidualClass::Converged
    } else {
        ResidualClass::NotConverged
    }
}

/// A design point or case counts as converged only with good CoVs and
/// converged residuals.
pub fn is_converged(cov: CovClass, residuals: ResidualClass) -> bool {
    cov == CovClass::Good && residuals == ResidualClass::Converged
}
