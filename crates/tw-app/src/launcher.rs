//! Solver launch: executable discovery, queue submission, the server-file
//! handshake and the offline session used for dry runs.

use crate::error::{AppError, AppResult};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tw_config::tree::string_list;
use tw_config::{Case, Config, Launching};
use tw_driver::{OfflineSession, SolverSession, SolverVersion};

/// Poll interval while a queued solver starts.
pub const SERVER_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Hands out the one solver session of a wizard run.
pub trait SessionLauncher {
    fn launch(&mut self, config: &Config) -> AppResult<Box<dyn SolverSession>>;
}

/// Installation root variable for a release, `AWP_ROOT242` for 24.2.
pub fn awp_root_var(fl_version: &str) -> AppResult<String> {
    let version = SolverVersion::parse(fl_version)?;
    Ok(version.awp_root_var())
}

/// Solver executable below the installation root named by `AWP_ROOT<maj><min>`.
pub fn solver_executable(
    fl_version: &str,
    lookup: impl Fn(&str) -> Option<String>,
) -> AppResult<PathBuf> {
    let variable = awp_root_var(fl_version)?;
    let root = lookup(&variable)
        .filter(|r| !r.is_empty())
        .ok_or(AppError::SolverNotFound { variable })?;
    Ok(Path::new(&root).join("fluent").join("bin").join("fluent"))
}

/// Command line of a solver start.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub server_file: PathBuf,
}

impl LaunchPlan {
    pub fn new(launching: &Launching, working_dir: &Path, executable: PathBuf) -> Self {
        let server_file = working_dir.join(&launching.serverfilename);
        let mut mode = if launching.dimension == 2 { "2d" } else { "3d" }.to_string();
        if launching.precision {
            mode.push_str("dp");
        }
        let mut args = vec![mode, format!("-t{}", launching.no_core.max(1))];
        match launching.ui_mode.as_str() {
            "gui" => {}
            "hidden_gui" => args.push("-hidden".to_string()),
            "no_gui_or_graphics" => args.push("-g".to_string()),
            _ => args.push("-gu".to_string()),
        }
        if launching.gpu {
            args.push("-gpu".to_string());
        }
        args.push(format!("-sifile={}", server_file.display()));
        Self {
            executable,
            args,
            working_dir: working_dir.to_path_buf(),
            server_file,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.executable.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Slurm submission of the same command.
    pub fn queue_command(&self, cores: u32) -> Vec<String> {
        vec![
            "sbatch".to_string(),
            "--job-name=ptw_solver".to_string(),
            format!("--ntasks={}", cores.max(1)),
            format!("--chdir={}", self.working_dir.display()),
            "--wrap".to_string(),
            self.command_line(),
        ]
    }
}

/// Block until the queued solver writes its server file.
pub fn wait_for_server_file(path: &Path, timeout: Duration, poll: Duration) -> AppResult<()> {
    let started = Instant::now();
    loop {
        if path.exists() {
            tracing::info!(path = %path.display(), "solver server file found");
            return Ok(());
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(AppError::LaunchTimeout {
                path: path.to_path_buf(),
                seconds: timeout.as_secs(),
            });
        }
        tracing::debug!(path = %path.display(), "waiting for solver");
        std::thread::sleep(poll.min(timeout - elapsed));
    }
}

/// Journal of a dry run, next to the debug dump.
pub fn journal_path(config: &Config) -> PathBuf {
    config.debug_dump_path().with_extension("jou")
}

const WALL_ROLES: [&str; 10] = [
    "bz_inlet_names",
    "bz_outlet_names",
    "bz_walls",
    "bz_walls_rotating_names",
    "bz_walls_counterrotating_names",
    "bz_walls_freeslip_names",
    "bz_symmetry_names",
    "bz_walls_torque",
    "bz_ep1_Euler",
    "bz_ep2_Euler",
];

const INTERFACE_ROLES: [&str; 4] = [
    "bz_interfaces_general_names",
    "bz_interfaces_mixingplane_names",
    "bz_interfaces_no_pitchscale_names",
    "bz_interfaces_pitchscale_names",
];

/// Register the zones a case names, as a mesher would export them.
fn seed_zones(session: &OfflineSession, case: &Case, seeded: &mut BTreeSet<String>) {
    let mut register = |zone: &str, kind: &str| {
        if seeded.insert(zone.to_string()) {
            session.register_boundary_zone(zone, kind);
        }
    };

    for (_, entry) in case.location_entries("bz_interfaces_periodic_names") {
        for side in ["side1", "side2"] {
            for zone in entry.get(side).map(string_list).unwrap_or_default() {
                session.allow_periodic_detection(&zone);
                register(&zone, "wall");
            }
        }
    }
    for role in INTERFACE_ROLES {
        for (_, entry) in case.location_entries(role) {
            for side in ["side1", "side2"] {
                for zone in entry.get(side).map(string_list).unwrap_or_default() {
                    register(&zone, "interface");
                }
            }
        }
    }
    for role in WALL_ROLES {
        for zone in case.location_list(role) {
            register(&zone, "wall");
        }
    }
    for (_, entry) in case.location_entries("tz_turbo_topology_names") {
        for (key, value) in &entry {
            if key.starts_with("tz_") {
                for zone in string_list(value) {
                    register(&zone, "wall");
                }
            }
        }
    }

    let rotating = case.location_list("cz_rotating_names");
    if rotating.is_empty() {
        session.register_cell_zone("fluid");
    }
    for zone in rotating {
        session.register_cell_zone(&zone);
    }
}

/// Launches nothing: every call is recorded into a journal that replays the
/// run against a real solver.
pub struct OfflineLauncher {
    session: Option<OfflineSession>,
    queue_command: Option<Vec<String>>,
    server_handshake: bool,
    poll: Duration,
}

impl Default for OfflineLauncher {
    fn default() -> Self {
        Self {
            session: None,
            queue_command: None,
            server_handshake: false,
            poll: SERVER_POLL_INTERVAL,
        }
    }
}

impl OfflineLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// With `queue_slurm`, wait for a server file written by a solver the
    /// user submitted, as a queued launch would.
    pub fn with_server_handshake(mut self, poll: Duration) -> Self {
        self.server_handshake = true;
        self.poll = poll;
        self
    }

    /// Handle on the session of the last launch.
    pub fn session(&self) -> Option<&OfflineSession> {
        self.session.as_ref()
    }

    /// Queue submission the last launch would have made.
    pub fn queue_command(&self) -> Option<&[String]> {
        self.queue_command.as_deref()
    }

    fn plan(config: &Config) -> LaunchPlan {
        let launching = config.launching();
        let executable = solver_executable(&launching.fl_version, |v| std::env::var(v).ok())
            .unwrap_or_else(|e| {
                tracing::debug!("{e}, using the solver on PATH");
                PathBuf::from("fluent")
            });
        LaunchPlan::new(launching, config.working_dir(), executable)
    }
}

impl SessionLauncher for OfflineLauncher {
    fn launch(&mut self, config: &Config) -> AppResult<Box<dyn SolverSession>> {
        let launching = config.launching();
        let plan = Self::plan(config);
        if launching.queue_slurm {
            let queue = plan.queue_command(launching.no_core);
            tracing::info!(command = %queue.join(" "), "queue submission");
            tracing::warn!(
                key = "launching.queue_slurm",
                "the offline backend does not submit to the queue"
            );
            self.queue_command = Some(queue);
            if self.server_handshake {
                wait_for_server_file(
                    &plan.server_file,
                    Duration::from_secs(launching.queue_waiting_time),
                    self.poll,
                )?;
            }
        } else {
            tracing::info!(command = %plan.command_line(), "solver command (not started)");
        }

        let session = OfflineSession::new(&launching.fl_version);
        session.set_working_dir(config.working_dir());
        session.set_compute_nodes(launching.no_core as usize);
        session.set_journal_file(journal_path(config));

        let mut seeded = BTreeSet::new();
        for name in config.case_names() {
            // broken cases are reported by the pipeline
            if let Ok(case) = config.resolve_case(&name) {
                seed_zones(&session, &case, &mut seeded);
            }
        }
        tracing::info!(
            version = %launching.fl_version,
            zones = seeded.len(),
            "offline solver session"
        );
        self.session = Some(session.clone());
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launching() -> Launching {
        Launching {
            no_core: 8,
            ..Launching::default()
        }
    }

    #[test]
    fn executable_comes_from_awp_root() {
        let exe = solver_executable("24.2.0", |v| {
            (v == "AWP_ROOT242").then(|| "/ansys_inc/v242".to_string())
        })
        .unwrap();
        assert_eq!(exe, PathBuf::from("/ansys_inc/v242/fluent/bin/fluent"));

        let err = solver_executable("23.1.0", |_| None).unwrap_err();
        assert!(matches!(err, AppError::SolverNotFound { variable } if variable == "AWP_ROOT231"));
    }

    #[test]
    fn plan_arguments() {
        let plan = LaunchPlan::new(&launching(), Path::new("/work"), PathBuf::from("fluent"));
        assert_eq!(plan.args[0], "3ddp");
        assert_eq!(plan.args[1], "-t8");
        assert!(plan.args.contains(&"-gu".to_string()));
        assert!(plan.command_line().ends_with("-sifile=/work/server-info.txt"));

        let queue = plan.queue_command(8);
        assert_eq!(queue[0], "sbatch");
        assert!(queue.contains(&"--ntasks=8".to_string()));
        assert_eq!(queue.last(), Some(&plan.command_line()));
    }

    #[test]
    fn single_precision_gpu() {
        let launching = Launching {
            precision: false,
            gpu: true,
            ..Launching::default()
        };
        let plan = LaunchPlan::new(&launching, Path::new("/work"), PathBuf::from("fluent"));
        assert_eq!(plan.args[0], "3d");
        assert!(plan.args.contains(&"-gpu".to_string()));
    }

    #[test]
    fn server_file_wait() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("server-info.txt");
        let short = Duration::from_millis(30);
        let err = wait_for_server_file(&file, short, Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, AppError::LaunchTimeout { .. }));

        std::fs::write(&file, "host:port").unwrap();
        wait_for_server_file(&file, short, Duration::from_millis(10)).unwrap();
    }
}
