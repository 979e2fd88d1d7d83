//! Driver adapter over a live CFD solver session.
//!
//! The solver is reached through two channels: a hierarchical settings tree
//! (path-addressed, with allowed-value introspection) and a textual command
//! channel. [`SolverSession`] is the seam an actual connection implements;
//! [`Driver`] is the facade the stages talk to, adding version capability
//! probes and the recoverable/fatal error split.

pub mod driver;
pub mod error;
pub mod offline;
pub mod session;
pub mod version;

pub use driver::{Driver, Feature, bc_path, cell_zone_path, type_segment};
pub use error::{DriverError, DriverResult};
pub use offline::OfflineSession;
pub use session::{MonitorData, SolverSession};
pub use version::SolverVersion;
