use serde_json::json;
use std::fs;
use tw_driver::{OfflineSession, SolverSession};
use tw_results::{
    CaseTableInputs, ReportFile, ROLLING_WINDOW, Table, case_report_table, latest_report_file,
    scrape_transcript, summarize,
};

fn run_offline(dir: &std::path::Path, iterations: usize) -> OfflineSession {
    let mut s = OfflineSession::new("24.2.0");
    s.set_working_dir(dir);
    s.set_evaluation("MP_PRt", 1.2);
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
    s.invoke("file/start_transcript", json!({"file_name": "caseA.trn"}))
        .unwrap();
    s.invoke("solution/run_calculation/iterate", json!({"iter_count": iterations}))
        .unwrap();
    s.invoke("file/stop_transcript", json!({})).unwrap();
    s
}

#[test]
fn offline_run_produces_a_numeric_report_table() {
    let dir = tempfile::tempdir().unwrap();
    run_offline(dir.path(), 5);

    let report = latest_report_file(dir.path(), "caseA_report").unwrap();
    let monitors = summarize(&ReportFile::read(&report).unwrap(), ROLLING_WINDOW);
    let transcript = scrape_transcript(&fs::read_to_string(dir.path().join("caseA.trn")).unwrap());
    assert_eq!(transcript.iterations, Some(5));
    assert!(!transcript.final_residuals.is_empty());

    let table = case_report_table(&CaseTableInputs {
        name: "caseA",
        monitors: &monitors,
        mass_balance: Some(0.0),
        transcript: Some(&transcript),
        ..Default::default()
    });
    let path = dir.path().join("caseA_reporttable.csv");
    table.write_csv(&path).unwrap();

    let read = Table::read_csv(&path).unwrap();
    assert_eq!(read.rows.len(), 1);
    let value = read.number(0, "rep-mp-prt").unwrap();
    assert!(value.is_finite());
    assert!(read.number(0, "Compute Nodes").is_some());
}

#[test]
fn monitor_data_matches_report_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = run_offline(dir.path(), 3);
    let live = ReportFile::from(session.monitor_data("report-file").unwrap());
    let disk = ReportFile::read(&dir.path().join("caseA_report.out")).unwrap();
    assert_eq!(live.columns, disk.columns);
    assert_eq!(live.rows, disk.rows);
}
