//! tw-core: shared foundation for the turbo wizard.
//!
//! Contains:
//! - units (uom SI types + parsing of unit-annotated solver literals)
//! - numeric (Real + sample statistics)
//! - error (shared error types)

pub mod error;
pub mod numeric;
pub mod units;

pub use error::{TwError, TwResult};
pub use numeric::*;
pub use units::*;
