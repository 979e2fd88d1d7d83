//! A solver session that runs without a solver.
//!
//! Every settings write and command is recorded in a journal that can be
//! replayed against a real session later. The settings tree is kept in memory
//! and seeded with the containers, enumerations and defaults a fresh solver
//! session exposes, so that stages can be exercised end to end: boundary
//! zones change type, expressions are imported and evaluated, `iterate`
//! produces report files and a transcript, and parametric studies produce
//! design points and per design point output folders.
//!
//! Handles are cheap clones of one shared state. Keep a clone to inspect the
//! session after handing the other to a [`crate::Driver`].

use crate::error::{DriverError, DriverResult};
use crate::session::{MonitorData, SolverSession};
use serde_json::{Map, Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tw_core::Literal;

pub const RESIDUAL_EQUATIONS: [&str; 7] = [
    "continuity",
    "x-velocity",
    "y-velocity",
    "z-velocity",
    "energy",
    "k",
    "omega",
];

pub const FIELD_NAMES: [&str; 16] = [
    "pressure",
    "total-pressure",
    "absolute-pressure",
    "velocity-magnitude",
    "temperature",
    "total-temperature",
    "mach-number",
    "density",
    "turb-kinetic-energy",
    "rel-velocity-magnitude",
    "axial-velocity",
    "radial-velocity",
    "tangential-velocity",
    "wall-shear",
    "y-plus",
    "mass-imbalance",
];

/// File name the solver uses for residual histories of a design point.
pub const RESIDUAL_CSV: &str = "Auto-generated-residuals-data-static.csv";

const REPORT_SCOPES: [&str; 8] = [
    "surface",
    "volume",
    "force",
    "drag",
    "lift",
    "moment",
    "flux",
    "single_valued_expression",
];

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn node<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in segments(path) {
        cur = cur.as_object()?.get(seg)?;
    }
    Some(cur)
}

fn node_mut<'a>(root: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut cur = root;
    for seg in segments(path) {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        cur = cur
            .as_object_mut()?
            .entry(seg.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    Some(cur)
}

fn pattern_matches(pattern: &str, path: &str) -> bool {
    let p: Vec<&str> = segments(pattern).collect();
    let q: Vec<&str> = segments(path).collect();
    p.len() == q.len() && p.iter().zip(&q).all(|(a, b)| *a == "*" || a == b)
}

fn text_arg(args: &Value, key: &str) -> String {
    args.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn file_stem(file: &str) -> String {
    let name = Path::new(file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file);
    // case-data files carry double extensions (.cas.h5)
    name.split('.').next().unwrap_or(name).to_string()
}

fn strip_quotes(cell: &str) -> String {
    cell.trim().trim_matches('"').to_string()
}

fn flag(text: &str) -> bool {
    matches!(text.to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

/// Scientific notation as the solver prints it: `1.2345e-03`.
fn sci(v: f64) -> String {
    let raw = format!("{v:.4e}");
    match raw.split_once('e') {
        Some((mantissa, exp)) => {
            let exp: i32 = exp.parse().unwrap_or(0);
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        None => raw,
    }
}

fn residual_at(iteration: usize, equation: usize) -> f64 {
    10f64.powf(-(iteration as f64) / 4.0) * (1.0 + 0.1 * equation as f64)
}

fn monitor_value(base: f64, iteration: usize) -> f64 {
    base * (1.0 + 0.05 / iteration as f64)
}

fn seeded_settings() -> Value {
    let equations: Map<String, Value> = RESIDUAL_EQUATIONS
        .iter()
        .map(|eq| {
            (
                eq.to_string(),
                json!({"check_convergence": true, "absolute_criteria": 0.001}),
            )
        })
        .collect();
    let report_definitions: Map<String, Value> = REPORT_SCOPES
        .iter()
        .map(|scope| (scope.to_string(), json!({})))
        .collect();
    json!({
        "setup": {
            "general": {
                "solver": {"type": "pressure-based", "time": "steady"},
                "operating_conditions": {
                    "operating_pressure": 101325.0,
                    "gravity": {"enable": false, "components": [0.0, 0.0, 0.0]}
                }
            },
            "models": {
                "energy": {"enabled": false, "viscous_dissipation": false},
                "viscous": {
                    "model": "k-omega",
                    "k_omega_model": "sst",
                    "transition_module": "none",
                    "geko_options": {"csep": 1.75, "cnw": 1.0, "cjet": 0.9}
                }
            },
            "materials": {
                "fluid": {
                    "air": {
                        "density": {"option": "constant", "value": 1.225},
                        "specific_heat": {"option": "constant", "value": 1006.43},
                        "thermal_conductivity": {"option": "constant", "value": 0.0242},
                        "molecular_weight": {"option": "constant", "value": 28.966},
                        "viscosity": {"option": "constant", "value": 1.7894e-05}
                    }
                }
            },
            "boundary_conditions": {},
            "cell_zone_conditions": {"fluid": {}},
            "named_expressions": {},
            "reference_values": {},
            "mesh_interfaces": {"interface": {}, "periodic": {}, "turbo_interface": {}},
            "turbo_models": {"turbo_topology": {}}
        },
        "solution": {
            "methods": {
                "gradient_scheme": "least-square-cell-based",
                "p_v_coupling": {"flow_scheme": "SIMPLE"},
                "spatial_discretization": {
                    "discretization_scheme": {
                        "pressure": "second-order",
                        "mom": "second-order-upwind",
                        "k": "first-order-upwind",
                        "omega": "first-order-upwind",
                        "temperature": "second-order-upwind"
                    }
                },
                "pseudo_time_method": {"formulation": {"coupled_solver": "off"}},
                "turbo_numerics": {"enabled": false}
            },
            "report_definitions": report_definitions,
            "monitor": {
                "residual": {
                    "options": {"plot_points": 1000, "store_points": 1000},
                    "equations": equations
                },
                "report_plots": {},
                "report_files": {},
                "convergence_conditions": {
                    "convergence_reports": {},
                    "condition": "any-condition-is-met",
                    "frequency": 1
                }
            },
            "initialization": {
                "reference_frame": "relative",
                "initialization_type": "hybrid",
                "defaults": {},
                "hybrid_init_options": {"general_settings": {"initial_pressure": false}}
            },
            "run_calculation": {
                "iter_count": 1,
                "pseudo_time_settings": {
                    "time_step_method": {
                        "time_step_method": "automatic",
                        "length_scale_methods": "conservative",
                        "time_step_size_scale_factor": 1.0
                    }
                }
            }
        },
        "results": {
            "surfaces": {"iso_surface": {}},
            "graphics": {"contour": {}}
        },
        "parametric_studies": {}
    })
}

fn seeded_allowed() -> Vec<(String, Vec<String>)> {
    let fields: Vec<&str> = FIELD_NAMES.to_vec();
    let table: Vec<(&str, Vec<&str>)> = vec![
        (
            "setup/models/viscous/model",
            vec![
                "inviscid",
                "laminar",
                "k-epsilon",
                "k-omega",
                "spalart-allmaras",
                "transition-sst",
                "reynolds-stress",
            ],
        ),
        (
            "setup/models/viscous/k_omega_model",
            vec!["wj-bsl-std", "standard", "geko", "bsl", "sst"],
        ),
        (
            "setup/models/viscous/transition_module",
            vec!["none", "gamma-transport-eqn", "gamma-algebraic"],
        ),
        (
            "setup/materials/fluid/*/density/option",
            vec![
                "constant",
                "ideal-gas",
                "incompressible-ideal-gas",
                "real-gas-peng-robinson",
                "polynomial",
            ],
        ),
        (
            "setup/materials/fluid/*/viscosity/option",
            vec!["constant", "sutherland", "power-law", "polynomial"],
        ),
        (
            "setup/materials/fluid/*/specific_heat/option",
            vec!["constant", "polynomial", "piecewise-polynomial"],
        ),
        (
            "setup/materials/fluid/*/thermal_conductivity/option",
            vec!["constant", "polynomial"],
        ),
        ("setup/materials/fluid/*/molecular_weight/option", vec!["constant"]),
        (
            "solution/methods/gradient_scheme",
            vec![
                "green-gauss-cell-based",
                "green-gauss-node-based",
                "least-square-cell-based",
            ],
        ),
        (
            "solution/methods/p_v_coupling/flow_scheme",
            vec!["SIMPLE", "SIMPLEC", "PISO", "Coupled"],
        ),
        (
            "solution/methods/spatial_discretization/discretization_scheme/*",
            vec![
                "first-order-upwind",
                "second-order-upwind",
                "power-law",
                "quick",
                "third-order-muscl",
                "second-order",
                "standard",
                "presto!",
                "linear",
                "body-force-weighted",
            ],
        ),
        (
            "solution/methods/pseudo_time_method/formulation/coupled_solver",
            vec!["off", "global-time-step", "local-time-step"],
        ),
        (
            "solution/run_calculation/pseudo_time_settings/time_step_method/time_step_method",
            vec!["automatic", "user-specified"],
        ),
        (
            "solution/run_calculation/pseudo_time_settings/time_step_method/length_scale_methods",
            vec!["conservative", "aggressive", "user-specified"],
        ),
        (
            "solution/report_definitions/surface/*/report_type",
            vec![
                "surface-area",
                "surface-areaavg",
                "surface-massavg",
                "surface-massflowrate",
                "surface-flowrate",
                "surface-facetavg",
                "surface-integral",
                "surface-vertexavg",
                "surface-sum",
                "surface-max",
                "surface-min",
            ],
        ),
        (
            "solution/report_definitions/volume/*/report_type",
            vec![
                "volume-zonevol",
                "volume-average",
                "volume-integral",
                "volume-massavg",
                "volume-max",
                "volume-min",
                "volume-mass",
                "volume-sum",
            ],
        ),
        (
            "solution/report_definitions/flux/*/report_type",
            vec!["flux-massflow", "flux-heattransfer", "flux-radheattransfer"],
        ),
        ("solution/report_definitions/*/*/field", fields.clone()),
        ("results/graphics/contour/*/field", fields.clone()),
        ("results/field_names", fields),
    ];
    table
        .into_iter()
        .map(|(p, v)| (p.to_string(), v.into_iter().map(String::from).collect()))
        .collect()
}

/// Output files of one simulated design point, relative to its folder.
type DpFiles = Vec<(String, String)>;

#[derive(Debug)]
struct State {
    version: String,
    root: Value,
    allowed: Vec<(String, Vec<String>)>,
    journal: Vec<String>,
    transcript: Vec<String>,
    transcript_path: Option<PathBuf>,
    journal_path: Option<PathBuf>,
    working_dir: PathBuf,
    evaluations: BTreeMap<String, f64>,
    field_values: BTreeMap<String, f64>,
    periodic_detectable: BTreeSet<String>,
    nonconformal: BTreeSet<String>,
    failing: BTreeSet<String>,
    rpvars: BTreeMap<String, String>,
    monitors: BTreeMap<String, (PathBuf, MonitorData)>,
    dp_runs: BTreeMap<(String, String), DpFiles>,
    last_read: Option<String>,
    compute_nodes: usize,
    iterations: usize,
    exited: bool,
}

#[derive(Debug, Clone)]
pub struct OfflineSession {
    state: Rc<RefCell<State>>,
}

impl OfflineSession {
    pub fn new(version: &str) -> Self {
        let state = State {
            version: version.to_string(),
            root: seeded_settings(),
            allowed: seeded_allowed(),
            journal: Vec::new(),
            transcript: Vec::new(),
            transcript_path: None,
            journal_path: None,
            working_dir: PathBuf::from("."),
            evaluations: BTreeMap::new(),
            field_values: BTreeMap::new(),
            periodic_detectable: BTreeSet::new(),
            nonconformal: BTreeSet::new(),
            failing: BTreeSet::new(),
            rpvars: BTreeMap::new(),
            monitors: BTreeMap::new(),
            dp_runs: BTreeMap::new(),
            last_read: None,
            compute_nodes: 2,
            iterations: 0,
            exited: false,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Directory relative file names are resolved against.
    pub fn set_working_dir(&self, dir: impl Into<PathBuf>) {
        self.state.borrow_mut().working_dir = dir.into();
    }

    /// Write the journal to `path` when the session exits.
    pub fn set_journal_file(&self, path: impl Into<PathBuf>) {
        self.state.borrow_mut().journal_path = Some(path.into());
    }

    pub fn set_compute_nodes(&self, nodes: usize) {
        self.state.borrow_mut().compute_nodes = nodes.max(1);
    }

    pub fn register_boundary_zone(&self, zone: &str, kind: &str) {
        let mut s = self.state.borrow_mut();
        let path = format!("setup/boundary_conditions/{}", kind.replace('-', "_"));
        if let Some(Value::Object(zones)) = node_mut(&mut s.root, &path) {
            zones.insert(zone.to_string(), json!({}));
        }
    }

    pub fn register_cell_zone(&self, zone: &str) {
        let mut s = self.state.borrow_mut();
        if let Some(Value::Object(zones)) =
            node_mut(&mut s.root, "setup/cell_zone_conditions/fluid")
        {
            zones.insert(zone.to_string(), json!({}));
        }
    }

    /// Allow periodic angle auto-detection for pairs involving `zone`.
    pub fn allow_periodic_detection(&self, zone: &str) {
        self.state
            .borrow_mut()
            .periodic_detectable
            .insert(zone.to_string());
    }

    /// Periodic pairs involving `zone` come out as non-conformal interfaces.
    pub fn mark_nonconformal(&self, zone: &str) {
        self.state.borrow_mut().nonconformal.insert(zone.to_string());
    }

    /// Make every command at `path` fail as the solver would.
    pub fn fail_command(&self, path: &str) {
        self.state.borrow_mut().failing.insert(path.to_string());
    }

    /// Fixed evaluation result for a named expression.
    pub fn set_evaluation(&self, name: &str, value: f64) {
        self.state
            .borrow_mut()
            .evaluations
            .insert(name.to_string(), value);
    }

    pub fn set_field_value(&self, field: &str, value: f64) {
        self.state
            .borrow_mut()
            .field_values
            .insert(field.to_string(), value);
    }

    pub fn set_allowed(&self, pattern: &str, values: &[&str]) {
        let mut s = self.state.borrow_mut();
        s.allowed.retain(|(p, _)| p != pattern);
        s.allowed.insert(
            0,
            (
                pattern.to_string(),
                values.iter().map(|v| v.to_string()).collect(),
            ),
        );
    }

    pub fn journal(&self) -> Vec<String> {
        self.state.borrow().journal.clone()
    }

    pub fn settings(&self) -> Value {
        self.state.borrow().root.clone()
    }

    pub fn rpvar(&self, name: &str) -> Option<String> {
        self.state.borrow().rpvars.get(name).cloned()
    }

    pub fn iterations(&self) -> usize {
        self.state.borrow().iterations
    }

    pub fn write_journal(&self, path: &Path) -> DriverResult<()> {
        self.state.borrow().write_journal(path)
    }

    fn alive(&self) -> DriverResult<()> {
        if self.state.borrow().exited {
            return Err(DriverError::Session("session has exited".to_string()));
        }
        Ok(())
    }
}

impl State {
    fn resolve(&self, file: &str) -> PathBuf {
        let p = Path::new(file);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }

    fn record(&mut self, line: String) {
        self.transcript.push(format!("> {line}"));
        self.journal.push(line);
    }

    fn write_journal(&self, path: &Path) -> DriverResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut text = self.journal.join("\n");
        text.push('\n');
        fs::write(path, text)?;
        Ok(())
    }

    fn allowed_for(&self, path: &str) -> Vec<String> {
        // exact patterns win over wildcards
        if let Some((_, values)) = self.allowed.iter().find(|(p, _)| p == path) {
            return values.clone();
        }
        self.allowed
            .iter()
            .find(|(p, _)| pattern_matches(p, path))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    fn set(&mut self, path: &str, value: Value) -> DriverResult<()> {
        if let Value::String(text) = &value {
            let allowed = self.allowed_for(path);
            if !allowed.is_empty() && !allowed.contains(text) {
                return Err(DriverError::NotAllowed {
                    path: path.to_string(),
                    value: text.clone(),
                    allowed: allowed.join(", "),
                });
            }
        }
        self.record(format!("set {path} = {value}"));
        let slot = node_mut(&mut self.root, path).ok_or_else(|| DriverError::NotFound {
            path: path.to_string(),
        })?;
        *slot = value;
        Ok(())
    }

    fn child_names(&self, path: &str) -> DriverResult<Vec<String>> {
        match node(&self.root, path) {
            Some(Value::Object(map)) => Ok(map
                .iter()
                .filter(|(_, v)| v.is_object())
                .map(|(k, _)| k.clone())
                .collect()),
            _ => Err(DriverError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn create(&mut self, path: &str, name: &str) -> DriverResult<()> {
        self.record(format!("create {path}/{name}"));
        match node_mut(&mut self.root, path) {
            Some(Value::Object(map)) => {
                map.entry(name.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                Ok(())
            }
            _ => Err(DriverError::NotFound {
                path: path.to_string(),
            }),
        }
    }

    fn rename(&mut self, path: &str, old: &str, new: &str) -> DriverResult<()> {
        self.record(format!("rename {path}/{old} -> {new}"));
        let missing = || DriverError::NotFound {
            path: format!("{path}/{old}"),
        };
        let map = node_mut(&mut self.root, path)
            .and_then(Value::as_object_mut)
            .ok_or_else(missing)?;
        let value = map.remove(old).ok_or_else(missing)?;
        map.insert(new.to_string(), value);
        Ok(())
    }

    fn zone_kind(&self, zone: &str) -> Option<String> {
        let kinds = node(&self.root, "setup/boundary_conditions")?.as_object()?;
        kinds
            .iter()
            .find(|(_, zones)| zones.get(zone).is_some())
            .map(|(kind, _)| kind.clone())
    }

    fn move_zone(&mut self, zone: &str, kind: &str) -> DriverResult<()> {
        let current = self.zone_kind(zone).ok_or_else(|| DriverError::NotFound {
            path: format!("setup/boundary_conditions/*/{zone}"),
        })?;
        let target = kind.replace('-', "_");
        if current == target {
            return Ok(());
        }
        if let Some(Value::Object(zones)) =
            node_mut(&mut self.root, &format!("setup/boundary_conditions/{current}"))
        {
            zones.remove(zone);
        }
        if let Some(Value::Object(zones)) =
            node_mut(&mut self.root, &format!("setup/boundary_conditions/{target}"))
        {
            zones.insert(zone.to_string(), json!({}));
        }
        Ok(())
    }

    fn evaluate(&self, name: &str) -> DriverResult<f64> {
        if let Some(v) = self.evaluations.get(name) {
            return Ok(*v);
        }
        let definition = node(
            &self.root,
            &format!("setup/named_expressions/{name}/definition"),
        )
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::NotFound {
            path: format!("setup/named_expressions/{name}"),
        })?;
        // composite definitions evaluate to unity offline
        Ok(Literal::parse(definition).map(|l| l.si_value()).unwrap_or(1.0))
    }

    fn report_value(&self, report: &str) -> f64 {
        for scope in REPORT_SCOPES {
            let Some(def) = node(
                &self.root,
                &format!("solution/report_definitions/{scope}/{report}"),
            ) else {
                continue;
            };
            return match scope {
                "single_valued_expression" => def
                    .get("definition")
                    .and_then(Value::as_str)
                    .and_then(|expr| self.evaluate(expr.trim()).ok())
                    .unwrap_or(1.0),
                "flux" => 0.0,
                _ => def
                    .get("field")
                    .and_then(Value::as_str)
                    .and_then(|f| self.field_values.get(f).copied())
                    .unwrap_or(1.0),
            };
        }
        1.0
    }

    /// (report file name, file name on disk, report names) for every report file.
    fn report_files(&self) -> Vec<(String, String, Vec<String>)> {
        let Some(Value::Object(files)) = node(&self.root, "solution/monitor/report_files")
        else {
            return Vec::new();
        };
        files
            .iter()
            .map(|(name, def)| {
                let file_name = def
                    .get("file_name")
                    .and_then(Value::as_str)
                    .map(String::from)
                    .unwrap_or_else(|| format!("{name}.out"));
                let reports = def
                    .get("report_defs")
                    .and_then(Value::as_array)
                    .map(|a| {
                        a.iter()
                            .filter_map(Value::as_str)
                            .map(String::from)
                            .collect()
                    })
                    .unwrap_or_default();
                (name.clone(), file_name, reports)
            })
            .collect()
    }

    fn residual_equations(&self) -> Vec<String> {
        self.child_names("solution/monitor/residual/equations")
            .unwrap_or_default()
    }

    fn iterate(&mut self, count: usize) -> DriverResult<Value> {
        let start = self.iterations + 1;
        let end = self.iterations + count;

        for (name, file_name, reports) in self.report_files() {
            let bases: Vec<f64> = reports.iter().map(|r| self.report_value(r)).collect();
            let path = match self.monitors.get(&name) {
                Some((path, _)) => path.clone(),
                None => next_free_path(&self.resolve(&file_name)),
            };
            let mut data = self
                .monitors
                .get(&name)
                .map(|(_, d)| d.clone())
                .unwrap_or_else(|| MonitorData {
                    columns: std::iter::once("Iteration".to_string())
                        .chain(reports.iter().cloned())
                        .collect(),
                    rows: Vec::new(),
                });
            for it in start..=end {
                let mut row = vec![it as f64];
                row.extend(bases.iter().map(|b| monitor_value(*b, it)));
                data.rows.push(row);
            }
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, render_report_file(&name, &data))?;
            self.monitors.insert(name, (path, data));
        }

        let equations = self.residual_equations();
        self.transcript.extend(residual_table(&equations, start, end));
        self.transcript
            .extend(performance_timer(count, self.compute_nodes));
        self.iterations = end;
        self.write_transcript()?;
        Ok(Value::from(self.iterations))
    }

    /// The transcript file grows while the solver runs.
    fn write_transcript(&self) -> DriverResult<()> {
        if let Some(path) = &self.transcript_path {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut text = self.transcript.join("\n");
            text.push('\n');
            fs::write(path, text)?;
        }
        Ok(())
    }

    fn flush_transcript(&mut self) -> DriverResult<()> {
        self.write_transcript()?;
        self.transcript_path = None;
        self.transcript.clear();
        Ok(())
    }

    fn import_expressions(&mut self, file: &str) -> DriverResult<Value> {
        let path = self.resolve(file);
        let text = fs::read_to_string(&path)?;
        for line in text.lines().skip(1) {
            let cells: Vec<String> = line.split('\t').map(strip_quotes).collect();
            let Some(name) = cells.first().filter(|n| !n.is_empty()) else {
                continue;
            };
            let entry = json!({
                "definition": cells.get(1).cloned().unwrap_or_default(),
                "input_parameter": cells.get(2).is_some_and(|c| flag(c)),
                "output_parameter": cells.get(3).is_some_and(|c| flag(c)),
                "description": cells.get(4).cloned().unwrap_or_default(),
            });
            if let Some(Value::Object(exprs)) =
                node_mut(&mut self.root, "setup/named_expressions")
            {
                exprs.insert(name.clone(), entry);
            }
        }
        Ok(Value::Null)
    }

    fn export_expressions(&self, file: &str) -> DriverResult<Value> {
        let path = self.resolve(file);
        let mut out = String::from(
            "\"Name\"\t\"Definition\"\t\"Input Parameter\"\t\"Output Parameter\"\t\"Description\"\n",
        );
        if let Some(Value::Object(exprs)) = node(&self.root, "setup/named_expressions") {
            for (name, e) in exprs {
                let text = |k: &str| e.get(k).and_then(Value::as_str).unwrap_or_default();
                let boolean = |k: &str| {
                    if e.get(k).and_then(Value::as_bool).unwrap_or(false) {
                        "True"
                    } else {
                        "False"
                    }
                };
                let _ = writeln!(
                    out,
                    "\"{name}\"\t\"{}\"\t\"{}\"\t\"{}\"\t\"{}\"",
                    text("definition"),
                    boolean("input_parameter"),
                    boolean("output_parameter"),
                    text("description"),
                );
            }
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
        Ok(Value::Null)
    }

    fn make_periodic(&mut self, args: &Value) -> DriverResult<Value> {
        let zone = text_arg(args, "zone_name");
        let shadow = text_arg(args, "shadow_zone_name");
        let explicit = args.get("angle").is_some_and(|a| !a.is_null())
            || args.get("offset").is_some_and(|o| !o.is_null());
        if !explicit
            && !self.periodic_detectable.contains(&zone)
            && !self.periodic_detectable.contains(&shadow)
        {
            return Err(DriverError::command(
                "setup/mesh_interfaces/make_periodic",
                format!("could not detect the periodic angle between {zone} and {shadow}"),
            ));
        }
        let nonconformal = self.nonconformal.contains(&zone) || self.nonconformal.contains(&shadow);
        let kind = if nonconformal { "interface" } else { "periodic" };
        self.move_zone(&zone, kind)?;
        self.move_zone(&shadow, kind)?;
        if let Some(Value::Object(periodics)) =
            node_mut(&mut self.root, "setup/mesh_interfaces/periodic")
        {
            let mut entry = args.clone();
            if let Value::Object(m) = &mut entry {
                m.insert("nonconformal".to_string(), Value::from(nonconformal));
            }
            periodics.insert(zone.clone(), entry);
        }
        Ok(Value::from(zone))
    }

    fn store_named(&mut self, container: &str, key: &str, args: &Value) -> DriverResult<Value> {
        let name = text_arg(args, key);
        if name.is_empty() {
            return Err(DriverError::command(container, format!("missing '{key}'")));
        }
        if let Some(Value::Object(items)) = node_mut(&mut self.root, container) {
            items.insert(name.clone(), args.clone());
        }
        Ok(Value::from(name))
    }

    fn compute_reports(&self, args: &Value) -> Value {
        let names: Vec<String> = args
            .get("report_defs")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
            .unwrap_or_default();
        let results: Map<String, Value> = names
            .into_iter()
            .map(|n| {
                let v = self.report_value(&n);
                (n, Value::from(v))
            })
            .collect();
        Value::Object(results)
    }

    fn parameter_names(&self, role: &str) -> Vec<String> {
        node(&self.root, "setup/named_expressions")
            .and_then(Value::as_object)
            .map(|exprs| {
                exprs
                    .iter()
                    .filter(|(_, e)| e.get(role).and_then(Value::as_bool).unwrap_or(false))
                    .map(|(n, _)| n.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn write_output_parameters(&self, file: &str) -> DriverResult<Value> {
        let mut out = String::new();
        for name in self.parameter_names("output_parameter") {
            let _ = writeln!(out, "{name} {}", self.evaluate(&name).unwrap_or(f64::NAN));
        }
        let path = self.resolve(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
        Ok(Value::Null)
    }

    fn write_summary(&self, file: &str) -> DriverResult<Value> {
        let mut out = format!("Solver {} summary\n\nBoundary conditions\n", self.version);
        if let Some(Value::Object(kinds)) = node(&self.root, "setup/boundary_conditions") {
            for (kind, zones) in kinds {
                if let Value::Object(zones) = zones {
                    for zone in zones.keys() {
                        let _ = writeln!(out, "  {zone}: {}", kind.replace('_', "-"));
                    }
                }
            }
        }
        let _ = writeln!(out, "\nIterations: {}", self.iterations);
        let path = self.resolve(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
        Ok(Value::Null)
    }

    fn study_path(study: &str) -> String {
        format!("parametric_studies/{study}")
    }

    fn initialize_study(&mut self) -> DriverResult<Value> {
        let base = self.last_read.clone().unwrap_or_else(|| "case".to_string());
        let study = format!("{base}-Solve");
        let mut inputs = Map::new();
        for name in self.parameter_names("input_parameter") {
            inputs.insert(name.clone(), Value::from(self.evaluate(&name)?));
        }
        let mut outputs = Map::new();
        for name in self.parameter_names("output_parameter") {
            outputs.insert(name, Value::Null);
        }
        let base_dp = json!({
            "input_parameters": inputs,
            "output_parameters": outputs,
            "write_data": false,
            "capture_simulation_report_data": true,
            "status": "Out of Date"
        });
        let entry = json!({
            "current_design_point": "Base DP",
            "reread_case": true,
            "initialization": "base",
            "design_points": {"Base DP": base_dp}
        });
        if let Some(Value::Object(studies)) = node_mut(&mut self.root, "parametric_studies") {
            studies.insert(study.clone(), entry);
        }
        Ok(Value::from(study))
    }

    fn design_point_names(&self, study: &str) -> Vec<String> {
        self.child_names(&format!("{}/design_points", Self::study_path(study)))
            .unwrap_or_default()
    }

    fn duplicate_dp(&mut self, study: &str, args: &Value) -> DriverResult<Value> {
        let source = args
            .get("design_point")
            .and_then(Value::as_str)
            .unwrap_or("Base DP")
            .to_string();
        let container = format!("{}/design_points", Self::study_path(study));
        let existing = self.design_point_names(study);
        let mut template = node(&self.root, &format!("{container}/{source}"))
            .cloned()
            .ok_or_else(|| DriverError::NotFound {
                path: format!("{container}/{source}"),
            })?;
        let mut index = existing.len();
        let mut name = format!("DP{index}");
        while existing.contains(&name) {
            index += 1;
            name = format!("DP{index}");
        }
        if let Value::Object(m) = &mut template {
            m.insert("status".to_string(), Value::from("Out of Date"));
        }
        if let Some(Value::Object(dps)) = node_mut(&mut self.root, &container) {
            dps.insert(name.clone(), template);
        }
        Ok(Value::from(name))
    }

    fn update_all(&mut self, study: &str) -> DriverResult<Value> {
        let container = format!("{}/design_points", Self::study_path(study));
        let names = self.design_point_names(study);
        let base_inputs = node(&self.root, &format!("{container}/Base DP/input_parameters"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let iterations = node(&self.root, "solution/run_calculation/iter_count")
            .and_then(Value::as_u64)
            .unwrap_or(10)
            .max(1) as usize;
        let equations = self.residual_equations();
        let report_files = self.report_files();

        for dp in names {
            let dp_path = format!("{container}/{dp}");
            let inputs = node(&self.root, &format!("{dp_path}/input_parameters"))
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            // outputs follow the first input parameter's ratio to the Base DP
            let factor = base_inputs
                .iter()
                .next()
                .and_then(|(k, base)| {
                    let b = base.as_f64()?;
                    let v = inputs.get(k)?.as_f64()?;
                    (b.abs() > f64::EPSILON).then(|| v / b)
                })
                .unwrap_or(1.0);

            let mut outputs = Map::new();
            for name in self.parameter_names("output_parameter") {
                outputs.insert(name.clone(), Value::from(self.evaluate(&name)? * factor));
            }

            let mut files: DpFiles = Vec::new();
            for (name, file_name, reports) in &report_files {
                let mut data = MonitorData {
                    columns: std::iter::once("Iteration".to_string())
                        .chain(reports.iter().cloned())
                        .collect(),
                    rows: Vec::new(),
                };
                for it in 1..=iterations {
                    let mut row = vec![it as f64];
                    row.extend(
                        reports
                            .iter()
                            .map(|r| monitor_value(self.report_value(r) * factor, it)),
                    );
                    data.rows.push(row);
                }
                let base_name = Path::new(file_name)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("report.out")
                    .to_string();
                files.push((base_name, render_report_file(name, &data)));
            }
            files.push((RESIDUAL_CSV.to_string(), residual_csv(&equations, iterations)));
            let mut transcript = residual_table(&equations, 1, iterations);
            transcript.extend(performance_timer(iterations, self.compute_nodes));
            files.push(("solution.trn".to_string(), transcript.join("\n") + "\n"));
            self.dp_runs.insert((study.to_string(), dp.clone()), files);

            if let Some(Value::Object(record)) = node_mut(&mut self.root, &dp_path) {
                record.insert("output_parameters".to_string(), Value::Object(outputs));
                record.insert("status".to_string(), Value::from("Updated : Converged"));
            }
        }
        self.transcript
            .push(format!("Parametric study {study}: all design points updated"));
        Ok(Value::Null)
    }

    fn export_design_table(&self, study: &str, file: &str) -> DriverResult<Value> {
        let container = format!("{}/design_points", Self::study_path(study));
        let inputs = self.parameter_names("input_parameter");
        let outputs = self.parameter_names("output_parameter");
        let mut out = String::from("Design Point");
        for name in inputs.iter().chain(&outputs) {
            let _ = write!(out, ",{name}");
        }
        out.push_str(",Status\n");
        for dp in self.design_point_names(study) {
            let record = node(&self.root, &format!("{container}/{dp}"));
            out.push_str(&dp);
            for (section, names) in [("input_parameters", &inputs), ("output_parameters", &outputs)] {
                for name in names.iter() {
                    let cell = record
                        .and_then(|r| r.get(section))
                        .and_then(|s| s.get(name))
                        .and_then(Value::as_f64)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    let _ = write!(out, ",{cell}");
                }
            }
            let status = record
                .and_then(|r| r.get("status"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            let _ = writeln!(out, ",{status}");
        }
        let path = self.resolve(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, out)?;
        Ok(Value::Null)
    }

    fn save_project(&self, file: &str) -> DriverResult<Value> {
        let path = self.resolve(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let studies = node(&self.root, "parametric_studies")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let text = serde_json::to_string_pretty(&json!({ "parametric_studies": studies }))
            .map_err(|e| DriverError::command("file/parametric_project/save_as", e.to_string()))?;
        fs::write(&path, text)?;

        let database = path.with_extension("cffdb");
        fs::create_dir_all(&database)?;
        if let Value::Object(studies) = &studies {
            for study in studies.keys() {
                for (index, dp) in self.design_point_names(study).iter().enumerate() {
                    let folder = database.join(study).join(format!("dp{index}"));
                    fs::create_dir_all(&folder)?;
                    if let Some(files) = self.dp_runs.get(&(study.clone(), dp.clone())) {
                        for (name, content) in files {
                            fs::write(folder.join(name), content)?;
                        }
                    }
                }
            }
        }
        Ok(Value::Null)
    }

    fn open_project(&mut self, file: &str) -> DriverResult<Value> {
        let path = self.resolve(file);
        let text = fs::read_to_string(&path).map_err(|e| {
            DriverError::command("file/parametric_project/open", format!("{}: {e}", path.display()))
        })?;
        let project: Value = serde_json::from_str(&text)
            .map_err(|e| DriverError::command("file/parametric_project/open", e.to_string()))?;
        let studies = project
            .get("parametric_studies")
            .cloned()
            .unwrap_or_else(|| json!({}));
        if let Some(slot) = node_mut(&mut self.root, "parametric_studies") {
            *slot = studies;
        }
        Ok(Value::Null)
    }

    fn study_command(&mut self, rest: &str, args: &Value) -> DriverResult<Value> {
        let Some((study, command)) = rest.split_once('/') else {
            return Ok(Value::Null);
        };
        if node(&self.root, &Self::study_path(study)).is_none() {
            return Err(DriverError::NotFound {
                path: Self::study_path(study),
            });
        }
        match command {
            "design_points/duplicate" => self.duplicate_dp(study, args),
            "design_points/update_all" => self.update_all(study),
            "use_base_data" => {
                self.set(&format!("{}/initialization", Self::study_path(study)), json!("base"))?;
                Ok(Value::Null)
            }
            "use_data_of_previous_dp" => {
                self.set(
                    &format!("{}/initialization", Self::study_path(study)),
                    json!("previous"),
                )?;
                Ok(Value::Null)
            }
            "export_design_table" => self.export_design_table(study, &text_arg(args, "filepath")),
            _ => Ok(Value::Null),
        }
    }

    fn invoke(&mut self, path: &str, args: Value) -> DriverResult<Value> {
        self.record(format!("invoke {path} {args}"));
        if self.failing.contains(path) {
            return Err(DriverError::command(path, "rejected by solver"));
        }
        match path {
            "file/read_case" | "file/read_case_data" | "file/read_mesh" => {
                self.last_read = Some(file_stem(&text_arg(&args, "file_name")));
                Ok(Value::Null)
            }
            "file/start_transcript" => {
                let file = self.resolve(&text_arg(&args, "file_name"));
                self.transcript.clear();
                self.transcript_path = Some(file);
                Ok(Value::Null)
            }
            "file/stop_transcript" => {
                self.flush_transcript()?;
                Ok(Value::Null)
            }
            "setup/boundary_conditions/set_zone_type" => {
                let zones: Vec<String> = args
                    .get("zone_list")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
                    .unwrap_or_default();
                let kind = text_arg(&args, "new_type");
                for zone in &zones {
                    if self.zone_kind(zone).is_none() {
                        return Err(DriverError::NotFound {
                            path: format!("setup/boundary_conditions/*/{zone}"),
                        });
                    }
                }
                for zone in &zones {
                    self.move_zone(zone, &kind)?;
                }
                Ok(Value::Null)
            }
            "setup/named_expressions/import_from_tsv" => {
                self.import_expressions(&text_arg(&args, "file_name"))
            }
            "setup/named_expressions/export_to_tsv" => {
                self.export_expressions(&text_arg(&args, "file_name"))
            }
            "setup/mesh_interfaces/make_periodic" => self.make_periodic(&args),
            "setup/mesh_interfaces/create" => {
                self.store_named("setup/mesh_interfaces/interface", "name", &args)
            }
            "setup/mesh_interfaces/turbo_create" => {
                self.store_named("setup/mesh_interfaces/turbo_interface", "interface_name", &args)
            }
            "setup/turbo_models/turbo_topology/define_topology" => {
                self.store_named("setup/turbo_models/turbo_topology", "topology_name", &args)
            }
            "solution/run_calculation/iterate" => {
                let count = args.get("iter_count").and_then(Value::as_u64).unwrap_or(1) as usize;
                self.iterate(count)
            }
            "solution/report_definitions/compute" => Ok(self.compute_reports(&args)),
            "parameters/output_parameters/write_all_to_file" => {
                self.write_output_parameters(&text_arg(&args, "file_name"))
            }
            "results/report/summary" => self.write_summary(&text_arg(&args, "file_name")),
            "parametric_studies/initialize" => self.initialize_study(),
            "file/parametric_project/save_as" => {
                self.save_project(&text_arg(&args, "project_filename"))
            }
            "file/parametric_project/open" => {
                self.open_project(&text_arg(&args, "project_filename"))
            }
            _ => {
                if let Some(rest) = path.strip_prefix("parametric_studies/") {
                    return self.study_command(rest, &args);
                }
                if let Some(report) = path.strip_suffix("/create_output_parameter") {
                    if let Some(Value::Object(def)) = node_mut(&mut self.root, report) {
                        def.insert("output_parameter".to_string(), Value::from(true));
                    }
                }
                Ok(Value::Null)
            }
        }
    }

    fn scheme(&mut self, expression: &str) -> String {
        self.record(format!("scheme {expression}"));
        let inner = expression.trim().trim_start_matches('(').trim_end_matches(')');
        let mut tokens = inner.split_whitespace();
        match (tokens.next(), tokens.next()) {
            (Some("rpsetvar"), Some(name)) => {
                let value: Vec<&str> = tokens.collect();
                self.rpvars
                    .insert(name.trim_start_matches('\'').to_string(), value.join(" "));
                String::new()
            }
            (Some("rpgetvar"), Some(name)) => self
                .rpvars
                .get(name.trim_start_matches('\''))
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

/// First of `path`, `path_1`, `path_2`, ... that does not exist yet.
fn next_free_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report")
        .to_string();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("out")
        .to_string();
    let mut n = 1;
    loop {
        let candidate = path.with_file_name(format!("{stem}_{n}.{ext}"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn render_report_file(name: &str, data: &MonitorData) -> String {
    let quoted: Vec<String> = data.columns.iter().map(|c| format!("\"{c}\"")).collect();
    let mut out = format!("\"{name}\"\n{}\n", quoted.join(" "));
    let _ = writeln!(out, "({})", quoted.join(" "));
    for row in &data.rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| if i == 0 { format!("{}", *v as u64) } else { format!("{v}") })
            .collect();
        let _ = writeln!(out, "{}", cells.join(" "));
    }
    out
}

fn residual_table(equations: &[String], start: usize, end: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut header = format!("{:>6}", "iter");
    for eq in equations {
        let _ = write!(header, " {eq:>11}");
    }
    header.push_str("     time/iter");
    lines.push(header);
    for it in start..=end {
        let mut row = format!("{it:>6}");
        for (i, _) in equations.iter().enumerate() {
            let _ = write!(row, " {:>11}", sci(residual_at(it, i)));
        }
        let _ = write!(row, "  0:00:00 {:>5}", end - it);
        lines.push(row);
    }
    lines
}

fn residual_csv(equations: &[String], iterations: usize) -> String {
    let mut out = String::from("Iteration");
    for eq in equations {
        let _ = write!(out, ",{eq}");
    }
    out.push('\n');
    for it in 1..=iterations {
        out.push_str(&it.to_string());
        for (i, _) in equations.iter().enumerate() {
            let _ = write!(out, ",{}", residual_at(it, i));
        }
        out.push('\n');
    }
    out
}

fn performance_timer(iterations: usize, nodes: usize) -> Vec<String> {
    let per_iteration = 0.1;
    vec![
        String::new(),
        format!("Performance Timer for {iterations} iterations on {nodes} compute nodes"),
        format!("  Average wall-clock time per iteration:          {per_iteration:.3} sec"),
        "  Global reductions per iteration:                   112 ops".to_string(),
        String::new(),
        format!(
            "  Total wall-clock time:                          {:.3} sec",
            per_iteration * iterations as f64
        ),
        String::new(),
    ]
}

impl SolverSession for OfflineSession {
    fn version(&self) -> String {
        self.state.borrow().version.clone()
    }

    fn get(&self, path: &str) -> DriverResult<Value> {
        self.alive()?;
        node(&self.state.borrow().root, path)
            .cloned()
            .ok_or_else(|| DriverError::NotFound {
                path: path.to_string(),
            })
    }

    fn set(&mut self, path: &str, value: Value) -> DriverResult<()> {
        self.alive()?;
        self.state.borrow_mut().set(path, value)
    }

    fn exists(&self, path: &str) -> bool {
        node(&self.state.borrow().root, path).is_some()
    }

    fn child_names(&self, path: &str) -> DriverResult<Vec<String>> {
        self.alive()?;
        self.state.borrow().child_names(path)
    }

    fn allowed_values(&self, path: &str) -> DriverResult<Vec<String>> {
        Ok(self.state.borrow().allowed_for(path))
    }

    fn create(&mut self, path: &str, name: &str) -> DriverResult<()> {
        self.alive()?;
        self.state.borrow_mut().create(path, name)
    }

    fn rename(&mut self, path: &str, old: &str, new: &str) -> DriverResult<()> {
        self.alive()?;
        self.state.borrow_mut().rename(path, old, new)
    }

    fn invoke(&mut self, path: &str, args: Value) -> DriverResult<Value> {
        self.alive()?;
        self.state.borrow_mut().invoke(path, args)
    }

    fn tui(&mut self, command: &str) -> DriverResult<String> {
        self.alive()?;
        let mut s = self.state.borrow_mut();
        s.record(format!("tui {command}"));
        if s.failing.iter().any(|f| command.starts_with(f.as_str())) {
            return Err(DriverError::command(command, "rejected by solver"));
        }
        let mut words = command.split_whitespace();
        if words
            .next()
            .is_some_and(|w| w.trim_start_matches('/').starts_with("file/read-case"))
            && let Some(file) = words.next()
        {
            s.last_read = Some(file_stem(file));
        }
        Ok(String::new())
    }

    fn scheme(&mut self, expression: &str) -> DriverResult<String> {
        self.alive()?;
        Ok(self.state.borrow_mut().scheme(expression))
    }

    fn field_data(&mut self, field: &str, locations: &[String]) -> DriverResult<Vec<f64>> {
        self.alive()?;
        let s = self.state.borrow();
        if !FIELD_NAMES.contains(&field) && !s.field_values.contains_key(field) {
            return Err(DriverError::NotAllowed {
                path: "results/field_names".to_string(),
                value: field.to_string(),
                allowed: FIELD_NAMES.join(", "),
            });
        }
        let value = s.field_values.get(field).copied().unwrap_or(0.0);
        Ok(vec![value; locations.len()])
    }

    fn expression_value(&mut self, name: &str) -> DriverResult<Value> {
        self.alive()?;
        let s = self.state.borrow();
        if let Some(v) = s.evaluations.get(name) {
            return Ok(Value::from(*v));
        }
        let definition = node(
            &s.root,
            &format!("setup/named_expressions/{name}/definition"),
        )
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::NotFound {
            path: format!("setup/named_expressions/{name}"),
        })?;
        // literals evaluate to their SI value, anything composite to unity
        Ok(match Literal::parse(definition) {
            Ok(l) => Value::from(l.si_value()),
            Err(_) if definition.trim().starts_with('\'') => Value::from(definition.trim()),
            Err(_) => Value::from(1.0),
        })
    }

    fn monitor_data(&mut self, report_file: &str) -> DriverResult<MonitorData> {
        self.alive()?;
        self.state
            .borrow()
            .monitors
            .get(report_file)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| DriverError::NotFound {
                path: format!("solution/monitor/report_files/{report_file}"),
            })
    }

    fn exit(&mut self) -> DriverResult<()> {
        let mut s = self.state.borrow_mut();
        if s.exited {
            return Ok(());
        }
        s.record("exit".to_string());
        s.flush_transcript()?;
        if let Some(path) = s.journal_path.clone() {
            s.write_journal(&path)?;
        }
        s.exited = true;
        Ok(())
    }
}
