//! Error types for solver access.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Settings path not found: {path}")]
    NotFound { path: String },

    #[error("Value '{value}' not allowed at {path} (allowed: {allowed})")]
    NotAllowed {
        path: String,
        value: String,
        allowed: String,
    },

    #[error("Command failed: {command}: {message}")]
    Command { command: String, message: String },

    #[error("Unsupported: {what}")]
    Unsupported { what: String },

    #[error("Invalid solver version: {0}")]
    Version(String),

    #[error("Solver session lost: {0}")]
    Session(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Fatal errors end the run; everything else is logged and recovered by
    /// the stage that issued the call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::Session(_) | DriverError::Io(_))
    }

    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
