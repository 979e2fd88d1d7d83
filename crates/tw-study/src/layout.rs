//! Where a study's files go.

use std::path::{Path, PathBuf};
use tw_config::{OUTPUT_DIR, StudyDef};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudyLayout {
    name: String,
    study_dir: PathBuf,
    project: PathBuf,
}

impl StudyLayout {
    pub fn new(working_dir: &Path, name: &str, def: &StudyDef) -> Self {
        let project = Path::new(&def.project_filename(name)).to_path_buf();
        let project = if project.is_absolute() {
            project
        } else {
            working_dir.join(project)
        };
        Self {
            name: name.to_string(),
            study_dir: working_dir.join(OUTPUT_DIR).join(format!("study_{name}")),
            project,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn study_dir(&self) -> &Path {
        &self.study_dir
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn set_project(&mut self, project: PathBuf) {
        self.project = project;
    }

    /// The solver's design-point database next to the project file.
    pub fn database(&self) -> PathBuf {
        self.project.with_extension("cffdb")
    }

    pub fn dp_table(&self) -> PathBuf {
        self.study_dir.join("dp_table.csv")
    }

    pub fn temp_data(&self) -> PathBuf {
        self.study_dir.join("temp_data.json")
    }

    pub fn plot_table(&self) -> PathBuf {
        self.study_dir.join(format!("plot_table_{}.csv", self.name))
    }

    pub fn plots_dir(&self, design_point: &str) -> PathBuf {
        self.study_dir
            .join("study_plots")
            .join(design_point.replace(' ', "_"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn project_defaults_to_study_name() {
        let def: StudyDef = serde_json::from_value(json!({"refCaseFilename": "caseA_fin"})).unwrap();
        let layout = StudyLayout::new(Path::new("/work"), "studyX", &def);
        assert_eq!(layout.project(), Path::new("/work/studyX.flprj"));
        assert_eq!(layout.database(), PathBuf::from("/work/studyX.cffdb"));
        assert_eq!(
            layout.plot_table(),
            PathBuf::from("/work/PTW_output/study_studyX/plot_table_studyX.csv")
        );
    }
}
