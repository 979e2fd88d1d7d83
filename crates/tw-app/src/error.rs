//! Error types for the tw-app service layer.

use std::path::PathBuf;

/// Application error type that wraps errors from the backend crates and
/// provides a unified error interface for the CLI.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Solver error: {0}")]
    Driver(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Solve error: {0}")]
    Solve(String),

    #[error("Results error: {0}")]
    Results(String),

    #[error("Study error: {0}")]
    Study(String),

    #[error("Solver did not come up: {path} missing after {seconds} s")]
    LaunchTimeout { path: PathBuf, seconds: u64 },

    #[error("Solver installation not found: {variable} is not set")]
    SolverNotFound { variable: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for tw-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<tw_config::ConfigError> for AppError {
    fn from(err: tw_config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<tw_driver::DriverError> for AppError {
    fn from(err: tw_driver::DriverError) -> Self {
        AppError::Driver(err.to_string())
    }
}

impl From<tw_setup::SetupError> for AppError {
    fn from(err: tw_setup::SetupError) -> Self {
        AppError::Setup(err.to_string())
    }
}

impl From<tw_solve::SolveError> for AppError {
    fn from(err: tw_solve::SolveError) -> Self {
        AppError::Solve(err.to_string())
    }
}

impl From<tw_results::ResultsError> for AppError {
    fn from(err: tw_results::ResultsError) -> Self {
        AppError::Results(err.to_string())
    }
}

impl From<tw_study::StudyError> for AppError {
    fn from(err: tw_study::StudyError) -> Self {
        AppError::Study(err.to_string())
    }
}
