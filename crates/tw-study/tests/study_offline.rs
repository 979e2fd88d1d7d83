use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tw_config::StudyDef;
use tw_driver::{Driver, OfflineSession, SolverSession};
use tw_results::Table;
use tw_study::{StudyLayout, StudyRunner, post_process};

const STUDY: &str = "parametric_studies/caseA_fin-Solve/design_points";

fn solved_session(dir: &Path) -> OfflineSession {
    versioned_session(dir, "24.2.0")
}

fn versioned_session(dir: &Path, version: &str) -> OfflineSession {
    let mut s = OfflineSession::new(version);
    s.set_working_dir(dir);
    s.create("setup/named_expressions", "BC_omega").unwrap();
    s.set("setup/named_expressions/BC_omega/definition", json!("1000 [rad/s]"))
        .unwrap();
    s.set("setup/named_expressions/BC_omega/input_parameter", json!(true))
        .unwrap();
    s.create("setup/named_expressions", "MP_PRt").unwrap();
    s.set("setup/named_expressions/MP_PRt/definition", json!("1.2"))
        .unwrap();
    s.set("setup/named_expressions/MP_PRt/output_parameter", json!(true))
        .unwrap();
    s.create("solution/report_definitions/single_valued_expression", "rep-mp-prt")
        .unwrap();
    s.set(
        "solution/report_definitions/single_valued_expression/rep-mp-prt/definition",
        json!("MP_PRt"),
    )
    .unwrap();
    s.create("solution/monitor/report_files", "report-file").unwrap();
    s.set(
        "solution/monitor/report_files/report-file/file_name",
        json!("caseA_report.out"),
    )
    .unwrap();
    s.set(
        "solution/monitor/report_files/report-file/report_defs",
        json!(["rep-mp-prt"]),
    )
    .unwrap();
    s.create(
        "solution/monitor/convergence_conditions/convergence_reports",
        "rep-mp-prt-cov",
    )
    .unwrap();
    s.set("solution/run_calculation/iter_count", json!(5)).unwrap();
    s
}

fn study(value: Value) -> StudyDef {
    serde_json::from_value(value).unwrap()
}

fn scale_study() -> StudyDef {
    study(json!({
        "refCaseFilename": "caseA_fin.cas.h5",
        "definition": [{
            "inputparameters": ["BC_omega"],
            "valueList": [[0.9, 1.0, 1.1]],
            "useScaleFactor": true
        }],
        "cov_list": ["MP_PRt"]
    }))
}

fn omega(session: &OfflineSession, dp: &str) -> f64 {
    session
        .get(&format!("{STUDY}/{dp}/input_parameters/BC_omega"))
        .unwrap()
        .as_f64()
        .unwrap()
}

#[test]
fn scale_factors_build_design_points() {
    let dir = tempfile::tempdir().unwrap();
    let session = solved_session(dir.path());
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let def = scale_study();
    let mut layout = StudyLayout::new(dir.path(), "studyX", &def);

    let outcome = StudyRunner::new()
        .run(&mut driver, &def, &mut layout)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.solver_study, "caseA_fin-Solve");
    assert_eq!(outcome.design_points, vec!["DP1", "DP2", "DP3"]);
    assert!(outcome.updated);
    assert!((omega(&session, "DP1") - 900.0).abs() < 1e-9);
    assert!((omega(&session, "DP2") - 1000.0).abs() < 1e-9);
    assert!((omega(&session, "DP3") - 1100.0).abs() < 1e-9);

    assert!(dir.path().join("studyX.flprj").exists());
    assert!(layout.temp_data().exists());
    let dp_table = Table::read_csv(&layout.dp_table()).unwrap();
    assert_eq!(dp_table.rows.len(), 4);
    assert_eq!(dp_table.number(1, "BC_omega").map(f64::round), Some(900.0));
}

#[test]
fn existing_project_is_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("studyX.flprj"), "{}").unwrap();
    let session = solved_session(dir.path());
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let def = scale_study();
    let mut layout = StudyLayout::new(dir.path(), "studyX", &def);

    let outcome = StudyRunner::new().run(&mut driver, &def, &mut layout).unwrap();
    assert!(outcome.is_none());
    assert!(!session.journal().iter().any(|l| l.contains("duplicate")));
}

#[test]
fn missing_project_skips_run_existing() {
    let dir = tempfile::tempdir().unwrap();
    let session = solved_session(dir.path());
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    let def = study(json!({"refCaseFilename": "caseA_fin.cas.h5", "runExistingProject": true}));
    let mut layout = StudyLayout::new(dir.path(), "studyY", &def);
    assert!(StudyRunner::new().run(&mut driver, &def, &mut layout).unwrap().is_none());
}

#[test]
fn old_solvers_read_later_studies_through_tui() {
    let dir = tempfile::tempdir().unwrap();
    let session = versioned_session(dir.path(), "23.1.0");
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut runner = StudyRunner::new();

    for name in ["studyA", "studyB"] {
        let def = scale_study();
        let mut layout = StudyLayout::new(dir.path(), name, &def);
        runner.run(&mut driver, &def, &mut layout).unwrap().unwrap();
    }
    let journal = session.journal();
    let structured = journal
        .iter()
        .filter(|l| l.starts_with("invoke file/read_case_data"))
        .count();
    assert_eq!(structured, 1);
    assert!(journal.contains(&"tui /file/read-case-data caseA_fin.cas.h5 yes".to_string()));
}

#[test]
fn post_processing_writes_operating_map() {
    let dir = tempfile::tempdir().unwrap();
    let session = solved_session(dir.path());
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    let def = scale_study();
    let mut layout = StudyLayout::new(dir.path(), "studyX", &def);
    StudyRunner::new()
        .run(&mut driver, &def, &mut layout)
        .unwrap()
        .unwrap();

    let outcome = post_process(&layout, &def, true).unwrap().unwrap();
    assert_eq!(outcome.design_points, 4);
    assert!(outcome.wall_clock_total > 0.0);

    let table = Table::read_csv(&outcome.plot_table).unwrap();
    for column in ["Design Point", "rep-mp-prt", "rep-mp-prt-cov", "CoV Convergence", "convergence"] {
        assert!(table.column_index(column).is_some(), "missing {column}");
    }
    assert!(layout.study_dir().join("rep-mp-prt_map.svg").exists());
    assert!(layout.plots_dir("DP1").join("rep-mp-prt.svg").exists());
}
