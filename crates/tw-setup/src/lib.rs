//! tw-setup: translate a resolved case into solver setup.
//!
//! Every stage takes a [`StageContext`] and reports recoverable solver
//! problems as warnings against the configuration key that caused them.

pub mod boundary;
pub mod cell_zones;
pub mod context;
pub mod error;
pub mod expressions;
pub mod interfaces;
pub mod materials;
pub mod numerics;
pub mod physics;
pub mod recipes;
pub mod reports;
pub mod topology;

pub use context::{CaseLayout, StageContext, report_name};
pub use error::{SetupError, SetupResult};
pub use interfaces::{InterfaceSummary, PeriodicPair};
pub use numerics::NumericsRecipe;
pub use recipes::{SetupOutcome, SetupRecipe, run_setup};
pub use reports::ReportSummary;
