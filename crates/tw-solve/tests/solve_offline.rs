use serde_json::{Map, Value, json};
use tw_config::Case;
use tw_driver::{Driver, OfflineSession};
use tw_setup::{CaseLayout, StageContext};
use tw_solve::{InitRecipe, initialize, run_solver};

fn case(solution: Value) -> Case {
    let mut body = Map::new();
    body.insert("solution".into(), solution);
    body.insert(
        "expressions".into(),
        json!({"BC_IN_p_gauge": "0 [Pa]", "BC_IN_Tt": "300 [K]"}),
    );
    Case::new("caseA", body)
}

#[test]
fn standard_init_computes_defaults_from_mass_flow_inlet() {
    let dir = tempfile::tempdir().unwrap();
    let session = OfflineSession::new("24.2.0");
    session.set_working_dir(dir.path());
    session.register_boundary_zone("inflow", "mass-flow-inlet");
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = case(json!({}));
    let layout = CaseLayout::new(dir.path(), "caseA");
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    initialize(&mut ctx, InitRecipe::Standard01).unwrap();

    let journal = session.journal();
    assert!(journal.iter().any(|l| l == "tui /mesh/reorder/reorder-domain"));
    let standard = journal
        .iter()
        .filter(|l| l.starts_with("invoke solution/initialization/standard_initialize"))
        .count();
    assert_eq!(standard, 2);
    assert!(
        journal
            .iter()
            .any(|l| l.contains("compute_defaults") && l.contains("inflow"))
    );
}

#[test]
fn fmg_uses_legacy_toggle_on_old_solvers() {
    let dir = tempfile::tempdir().unwrap();
    let session = OfflineSession::new("22.2.0");
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = case(json!({"reorder_domain": false}));
    let layout = CaseLayout::new(dir.path(), "caseA");
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    initialize(&mut ctx, InitRecipe::Fmg02).unwrap();

    assert!(session.rpvar("fmg-init/enable-with-pressure-based?").is_some());
    let journal = session.journal();
    assert!(!journal.iter().any(|l| l.contains("reorder-domain")));
    assert!(journal.iter().any(|l| l.starts_with("set solution/initialization/defaults/pressure")));
    assert!(journal.last().unwrap().contains("fmg_initialize"));
}

#[test]
fn solve_iterates_and_writes_final_case() {
    let dir = tempfile::tempdir().unwrap();
    let session = OfflineSession::new("24.2.0");
    session.set_working_dir(dir.path());
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = case(json!({"iter_count": 7}));
    let layout = CaseLayout::new(dir.path(), "caseA");
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let outcome = run_solver(&mut ctx).unwrap();
    assert!(outcome.ran);
    assert_eq!(outcome.iterations, 7);
    assert_eq!(session.iterations(), 7);
    assert!(session.journal().iter().any(|l| l.contains("caseA_fin")));
}

#[test]
fn disabled_solver_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let session = OfflineSession::new("24.2.0");
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = case(json!({"runSolver": false}));
    let layout = CaseLayout::new(dir.path(), "caseA");
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    assert!(!run_solver(&mut ctx).unwrap().ran);
    assert_eq!(session.iterations(), 0);
}
