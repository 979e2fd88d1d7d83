//! The solver collaborator contract.

use crate::error::DriverResult;
use serde_json::Value;

/// Monitor history as stored by the solver: one row per iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MonitorData {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

/// A live solver session.
///
/// Paths address the settings tree with `/` separators, for example
/// `setup/models/energy/enabled`. Named objects are children of their
/// container (`setup/boundary_conditions/pressure_inlet/inflow`).
pub trait SolverSession {
    /// Release string reported by the solver, e.g. "24.2.0".
    fn version(&self) -> String;

    fn get(&self, path: &str) -> DriverResult<Value>;

    fn set(&mut self, path: &str, value: Value) -> DriverResult<()>;

    fn exists(&self, path: &str) -> bool;

    /// Names of the named children of a container.
    fn child_names(&self, path: &str) -> DriverResult<Vec<String>>;

    /// Allowed values of an enumerated setting; empty when unrestricted.
    fn allowed_values(&self, path: &str) -> DriverResult<Vec<String>>;

    /// Create a named child of a container.
    fn create(&mut self, path: &str, name: &str) -> DriverResult<()>;

    fn rename(&mut self, path: &str, old: &str, new: &str) -> DriverResult<()>;

    /// Invoke a command object of the settings tree.
    fn invoke(&mut self, path: &str, args: Value) -> DriverResult<Value>;

    /// Legacy menu command on the textual channel.
    fn tui(&mut self, command: &str) -> DriverResult<String>;

    /// Scheme expression on the textual channel.
    fn scheme(&mut self, expression: &str) -> DriverResult<String>;

    /// Sampled scalar values of `field` over named surfaces or zones.
    fn field_data(&mut self, field: &str, locations: &[String]) -> DriverResult<Vec<f64>>;

    /// Evaluate a named expression.
    fn expression_value(&mut self, name: &str) -> DriverResult<Value>;

    /// History of a report file monitor.
    fn monitor_data(&mut self, report_file: &str) -> DriverResult<MonitorData>;

    /// Shut the session down.
    fn exit(&mut self) -> DriverResult<()>;
}
