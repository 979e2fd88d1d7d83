//! What every stage receives: the solver, the case and where its files go.

use std::path::{Path, PathBuf};
use tw_config::{Case, OUTPUT_DIR};
use tw_driver::Driver;

/// Output folder of one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseLayout {
    working_dir: PathBuf,
    case_dir: PathBuf,
}

impl CaseLayout {
    pub fn new(working_dir: &Path, case_name: &str) -> Self {
        Self {
            working_dir: working_dir.to_path_buf(),
            case_dir: working_dir.join(OUTPUT_DIR).join(format!("case_{case_name}")),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn case_dir(&self) -> &Path {
        &self.case_dir
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.case_dir.join(name)
    }

    /// A file in the case folder, spelled for the solver.
    pub fn solver_file(&self, name: &str) -> String {
        self.file(name).to_string_lossy().into_owned()
    }

    /// A user-supplied path, relative to the working directory unless absolute.
    pub fn input(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.working_dir.join(p)
        }
    }
}

pub struct StageContext<'a> {
    pub driver: &'a mut Driver,
    pub case: &'a mut Case,
    pub layout: &'a CaseLayout,
}

impl<'a> StageContext<'a> {
    pub fn new(driver: &'a mut Driver, case: &'a mut Case, layout: &'a CaseLayout) -> Self {
        Self {
            driver,
            case,
            layout,
        }
    }

    pub fn energy_enabled(&self) -> bool {
        self.driver
            .get("setup/models/energy/enabled")
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Solver report name for an expression: `MP_PRt` becomes `rep-mp-prt`.
pub fn report_name(expression: &str) -> String {
    format!("rep-{}", expression.to_lowercase().replace('_', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_names_are_lower_dashed() {
        assert_eq!(report_name("MP_PRt"), "rep-mp-prt");
        assert_eq!(report_name("MP_Isentropic_Efficiency"), "rep-mp-isentropic-efficiency");
    }

    #[test]
    fn case_folder_layout() {
        let layout = CaseLayout::new(Path::new("/work"), "caseA");
        assert_eq!(layout.case_dir(), Path::new("/work/PTW_output/case_caseA"));
        assert_eq!(layout.input("mesh.msh"), PathBuf::from("/work/mesh.msh"));
        assert_eq!(layout.input("/abs/mesh.msh"), PathBuf::from("/abs/mesh.msh"));
    }
}
