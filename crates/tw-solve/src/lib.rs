//! tw-solve: initialization recipes and the solve stage.

pub mod init;
pub mod solve;

pub use init::{InitRecipe, initialize};
pub use solve::{SolveOutcome, run_solver, write_case_data};

use tw_driver::DriverError;

pub type SolveResult<T> = Result<T, SolveError>;

#[derive(thiserror::Error, Debug)]
pub enum SolveError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
