//! Error types for the setup stages.

use thiserror::Error;
use tw_driver::DriverError;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("Unknown material '{name}' (library has: {known})")]
    UnknownMaterial { name: String, known: String },

    #[error("Invalid material library: {0}")]
    MaterialLibrary(String),

    #[error("Cannot read expression template {path}: {source}")]
    Template {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    /// Structural errors skip the case; the rest end the run.
    pub fn skips_case(&self) -> bool {
        matches!(
            self,
            SetupError::UnknownMaterial { .. }
                | SetupError::MaterialLibrary(_)
                | SetupError::Template { .. }
        )
    }
}

pub type SetupResult<T> = Result<T, SetupError>;
