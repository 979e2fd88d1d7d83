//! tw-study: parametric studies over a solved case and their post-processing.

pub mod design_points;
pub mod layout;
pub mod post;
pub mod runner;

pub use design_points::{DesignPointPlan, plan_design_points};
pub use layout::StudyLayout;
pub use post::{StudyPostOutcome, post_process};
pub use runner::{StudyOutcome, StudyRunner, skip_reason};

use tw_config::ValidationError;
use tw_driver::DriverError;
use tw_results::ResultsError;

pub type StudyResult<T> = Result<T, StudyError>;

#[derive(thiserror::Error, Debug)]
pub enum StudyError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Results error: {0}")]
    Results(#[from] ResultsError),

    #[error("Invalid study definition: {0}")]
    Definition(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Recipes of the `parametricstudy` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyRecipe {
    Study01,
}

impl StudyRecipe {
    pub fn from_name(name: &str) -> Option<Self> {
        (name == "study_01").then_some(Self::Study01)
    }
}

/// Recipes of the `parametricstudy_post` stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyPostRecipe {
    StudyPost01,
}

impl StudyPostRecipe {
    pub fn from_name(name: &str) -> Option<Self> {
        (name == "studyPost_01").then_some(Self::StudyPost01)
    }
}
