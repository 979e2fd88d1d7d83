//! Application layer of the turbomachinery wizard.
//!
//! Drives one solver session through every case of a configuration file
//! (mesh import, setup, numerics, initialization, solve, post-processing),
//! then through the parametric studies, and writes the run artifacts below
//! `PTW_output`.

pub mod error;
pub mod launcher;
pub mod pipeline;
pub mod post;
pub mod progress;
pub mod run_service;
pub mod stages;

pub use error::{AppError, AppResult};
pub use launcher::{LaunchPlan, OfflineLauncher, SessionLauncher, solver_executable};
pub use pipeline::{CaseReport, PipelineOptions, run_case};
pub use progress::{RunProgressEvent, RunStage};
pub use run_service::{RunSummary, StudyReport, run_wizard, run_wizard_with_progress};
