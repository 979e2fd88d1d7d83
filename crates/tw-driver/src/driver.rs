//! Facade over a [`SolverSession`].

use crate::error::{DriverError, DriverResult};
use crate::session::{MonitorData, SolverSession};
use crate::version::SolverVersion;
use serde_json::{Value, json};
use std::fmt::Display;

/// Capabilities that differ between solver releases or hardware back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Pseudo-time-step controls in run-calculation.
    PseudoTimeStep,
    /// Residual criteria addressed by equation name.
    NamedResidualEquations,
    /// Structured case reads for every study, not only the first.
    StructuredStudyCaseRead,
    /// Per-design-point case reread can be disabled.
    RereadCaseToggle,
    /// `Process='...'` argument in efficiency expressions.
    EfficiencyProcessArgument,
    /// FMG initialization needs the legacy runtime variable.
    LegacyFmgToggle,
    /// Convergence (CoV) reports.
    CovReports,
    /// Mixing-plane and pitch-scale turbo interfaces.
    MixingPlaneInterfaces,
    /// General interfaces created as turbo interfaces.
    TurboGeneralInterfaces,
    /// Turbo-specific numerics.
    TurboNumerics,
}

/// Path of a boundary zone in the settings tree.
pub fn bc_path(kind: &str, zone: &str) -> String {
    format!("setup/boundary_conditions/{}/{zone}", type_segment(kind))
}

/// Path of a fluid cell zone in the settings tree.
pub fn cell_zone_path(zone: &str) -> String {
    format!("setup/cell_zone_conditions/fluid/{zone}")
}

/// Zone types are spelled with dashes in commands and underscores in paths.
pub fn type_segment(kind: &str) -> String {
    kind.replace('-', "_")
}

pub struct Driver {
    session: Box<dyn SolverSession>,
    version: SolverVersion,
    gpu: bool,
}

impl Driver {
    pub fn new(session: Box<dyn SolverSession>, gpu: bool) -> DriverResult<Self> {
        let version = SolverVersion::parse(&session.version())?;
        tracing::info!(version = %version, gpu, "connected to solver session");
        Ok(Self {
            session,
            version,
            gpu,
        })
    }

    pub fn version(&self) -> SolverVersion {
        self.version
    }

    pub fn is_gpu(&self) -> bool {
        self.gpu
    }

    pub fn supports(&self, feature: Feature) -> bool {
        let v = self.version;
        match feature {
            Feature::PseudoTimeStep => v >= SolverVersion::new(23, 1),
            Feature::NamedResidualEquations => v >= SolverVersion::new(23, 1),
            Feature::StructuredStudyCaseRead => v >= SolverVersion::new(24, 1),
            Feature::RereadCaseToggle => v >= SolverVersion::new(24, 1),
            Feature::EfficiencyProcessArgument => v >= SolverVersion::new(23, 2),
            Feature::LegacyFmgToggle => v < SolverVersion::new(23, 1),
            Feature::CovReports
            | Feature::MixingPlaneInterfaces
            | Feature::TurboGeneralInterfaces
            | Feature::TurboNumerics => !self.gpu,
        }
    }

    pub fn get(&self, path: &str) -> DriverResult<Value> {
        self.session.get(path)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.session.exists(path)
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.session.child_names(path).unwrap_or_default()
    }

    pub fn allowed_values(&self, path: &str) -> Vec<String> {
        self.session.allowed_values(path).unwrap_or_default()
    }

    pub fn set(&mut self, path: &str, value: Value) -> DriverResult<()> {
        tracing::debug!(path, %value, "set");
        self.session.set(path, value)
    }

    pub fn create(&mut self, path: &str, name: &str) -> DriverResult<()> {
        tracing::debug!(path, name, "create");
        self.session.create(path, name)
    }

    pub fn rename(&mut self, path: &str, old: &str, new: &str) -> DriverResult<()> {
        self.session.rename(path, old, new)
    }

    pub fn invoke(&mut self, path: &str, args: Value) -> DriverResult<Value> {
        tracing::debug!(path, %args, "invoke");
        self.session.invoke(path, args)
    }

    pub fn tui(&mut self, command: &str) -> DriverResult<String> {
        tracing::debug!(command, "tui");
        self.session.tui(command)
    }

    pub fn scheme(&mut self, expression: &str) -> DriverResult<String> {
        tracing::debug!(expression, "scheme");
        self.session.scheme(expression)
    }

    /// Set a solver runtime variable.
    pub fn rpsetvar(&mut self, name: &str, value: impl Display) -> DriverResult<String> {
        self.scheme(&format!("(rpsetvar '{name} {value})"))
    }

    pub fn field_data(&mut self, field: &str, locations: &[String]) -> DriverResult<Vec<f64>> {
        self.session.field_data(field, locations)
    }

    pub fn expression_value(&mut self, name: &str) -> DriverResult<Value> {
        self.session.expression_value(name)
    }

    pub fn monitor_data(&mut self, report_file: &str) -> DriverResult<MonitorData> {
        self.session.monitor_data(report_file)
    }

    pub fn exit(&mut self) -> DriverResult<()> {
        self.session.exit()
    }

    /// Split a result into "done", "recovered" and "fatal".
    fn recover<T>(&self, result: DriverResult<T>, key: &str, what: &str) -> DriverResult<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(key, "{what} failed: {e}");
                Ok(None)
            }
        }
    }

    /// Set a value, logging recoverable failures against `key`.
    pub fn try_set(&mut self, path: &str, value: Value, key: &str) -> DriverResult<bool> {
        let result = self.set(path, value);
        Ok(self.recover(result, key, path)?.is_some())
    }

    pub fn try_invoke(&mut self, path: &str, args: Value, key: &str) -> DriverResult<Option<Value>> {
        let result = self.invoke(path, args);
        self.recover(result, key, path)
    }

    pub fn try_tui(&mut self, command: &str, key: &str) -> DriverResult<bool> {
        let result = self.tui(command);
        Ok(self.recover(result, key, command)?.is_some())
    }

    pub fn try_create(&mut self, path: &str, name: &str, key: &str) -> DriverResult<bool> {
        let result = self.create(path, name);
        Ok(self.recover(result, key, &format!("{path}/{name}"))?.is_some())
    }

    pub fn try_scheme(&mut self, expression: &str, key: &str) -> DriverResult<bool> {
        let result = self.scheme(expression);
        Ok(self.recover(result, key, expression)?.is_some())
    }

    pub fn try_rename(&mut self, path: &str, old: &str, new: &str, key: &str) -> DriverResult<bool> {
        let result = self.rename(path, old, new);
        Ok(self.recover(result, key, &format!("{path}/{old}"))?.is_some())
    }

    /// Set an enumerated value after checking it against the allowed list.
    pub fn set_enum(&mut self, path: &str, value: &str, key: &str) -> DriverResult<bool> {
        let allowed = self.allowed_values(path);
        if !allowed.is_empty() && !allowed.iter().any(|a| a == value) {
            let e = DriverError::NotAllowed {
                path: path.to_string(),
                value: value.to_string(),
                allowed: allowed.join(", "),
            };
            tracing::warn!(key, "{e}");
            return Ok(false);
        }
        self.try_set(path, Value::from(value), key)
    }

    /// True when `value` is accepted at `path` (unrestricted paths accept anything).
    pub fn is_allowed(&self, path: &str, value: &str) -> bool {
        let allowed = self.allowed_values(path);
        allowed.is_empty() || allowed.iter().any(|a| a == value)
    }

    /// All boundary zones as (name, type) pairs, types spelled with dashes.
    pub fn boundary_zones(&self) -> Vec<(String, String)> {
        let mut zones = Vec::new();
        for kind in self.children("setup/boundary_conditions") {
            for zone in self.children(&format!("setup/boundary_conditions/{kind}")) {
                zones.push((zone, kind.replace('_', "-")));
            }
        }
        zones
    }

    pub fn zone_type(&self, zone: &str) -> Option<String> {
        self.boundary_zones()
            .into_iter()
            .find(|(name, _)| name == zone)
            .map(|(_, kind)| kind)
    }

    pub fn cell_zones(&self) -> Vec<String> {
        self.children("setup/cell_zone_conditions/fluid")
    }

    /// Change the type of boundary zones.
    pub fn set_zone_type(&mut self, zones: &[String], kind: &str, key: &str) -> DriverResult<bool> {
        if zones.is_empty() {
            return Ok(true);
        }
        let pending: Vec<String> = zones
            .iter()
            .filter(|z| self.zone_type(z).as_deref() != Some(kind))
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(true);
        }
        Ok(self
            .try_invoke(
                "setup/boundary_conditions/set_zone_type",
                json!({"zone_list": pending, "new_type": kind}),
                key,
            )?
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::offline::OfflineSession;

    fn driver(version: &str, gpu: bool) -> Driver {
        Driver::new(Box::new(OfflineSession::new(version)), gpu).unwrap()
    }

    #[test]
    fn capability_probes_follow_version() {
        let old = driver("22.2.0", false);
        assert!(!old.supports(Feature::PseudoTimeStep));
        assert!(old.supports(Feature::LegacyFmgToggle));
        let new = driver("24.2.0", false);
        assert!(new.supports(Feature::RereadCaseToggle));
        assert!(new.supports(Feature::CovReports));
    }

    #[test]
    fn gpu_disables_turbo_features() {
        let gpu = driver("24.2.0", true);
        assert!(!gpu.supports(Feature::CovReports));
        assert!(!gpu.supports(Feature::MixingPlaneInterfaces));
        assert!(!gpu.supports(Feature::TurboNumerics));
    }

    #[test]
    fn set_enum_rejects_unknown_value() {
        let mut d = driver("24.2.0", false);
        assert!(!d.set_enum("setup/models/viscous/model", "no-such-model", "setup.turbulence_model").unwrap());
        assert!(d.set_enum("setup/models/viscous/model", "k-omega", "setup.turbulence_model").unwrap());
        assert_eq!(d.get("setup/models/viscous/model").unwrap(), Value::from("k-omega"));
    }

    #[test]
    fn zone_type_change() {
        let mut session = OfflineSession::new("24.2.0");
        session.register_boundary_zone("inflow", "wall");
        let mut d = Driver::new(Box::new(session), false).unwrap();
        assert_eq!(d.zone_type("inflow").as_deref(), Some("wall"));
        d.set_zone_type(&["inflow".to_string()], "pressure-inlet", "locations.bz_inlet_names")
            .unwrap();
        assert_eq!(d.zone_type("inflow").as_deref(), Some("pressure-inlet"));
        assert!(d.exists(&bc_path("pressure-inlet", "inflow")));
    }
}
