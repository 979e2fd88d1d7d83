//! tw-results: everything the wizard reads back after a run.
//!
//! Report-file parsing, rolling statistics, transcript scraping, CSV report
//! tables, convergence classification, SVG charts and case run manifests.

pub mod casetable;
pub mod chart;
pub mod convergence;
pub mod hash;
pub mod monitor;
pub mod stats;
pub mod store;
pub mod table;
pub mod transcript;

pub use casetable::{CaseTableInputs, case_report_table};
pub use chart::{Chart, Series};
pub use convergence::{CovClass, ResidualClass, classify_cov, classify_cov_set, classify_residuals};
pub use hash::compute_case_hash;
pub use monitor::{ReportFile, latest_report_file};
pub use stats::{MonitorSummary, ROLLING_WINDOW, rolling_cov, rolling_mean, summarize};
pub use store::{CaseManifest, CaseStatus, RunStore};
pub use table::{Cell, Table};
pub use transcript::{TranscriptSummary, scrape_transcript};

use std::path::PathBuf;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{path}:{line}: {message}")]
    Parse {
        path: String,
        line: usize,
        message: String,
    },

    #[error("No manifest for case: {case}")]
    ManifestNotFound { case: String },

    #[error("Invalid path: {}", path.display())]
    InvalidPath { path: PathBuf },
}
