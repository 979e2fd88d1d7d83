use thiserror::Error;

pub type TwResult<T> = Result<T, TwError>;

#[derive(Error, Debug)]
pub enum TwError {
    #[error("Invalid literal for {what}: '{text}'")]
    InvalidLiteral { what: &'static str, text: String },

    #[error("Unknown unit '{unit}' for {what}")]
    UnknownUnit { what: &'static str, unit: String },
}
