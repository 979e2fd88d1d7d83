use serde_json::json;
use tw_driver::{Driver, DriverError, Feature, OfflineSession, SolverSession};

#[test]
fn recoverable_failures_are_swallowed() {
    let session = OfflineSession::new("24.2.0");
    session.fail_command("mesh/check");
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();

    assert!(driver.try_invoke("mesh/check", json!({}), "meshFilename").unwrap().is_none());
    assert!(!driver.try_tui("mesh/check", "meshFilename").unwrap());
    assert!(
        !driver
            .try_set("setup/models/viscous/model", json!("unknown"), "setup.turbulence_model")
            .unwrap()
    );
    assert!(session.journal().iter().any(|l| l.starts_with("invoke mesh/check")));
}

#[test]
fn fatal_failures_propagate() {
    let session = OfflineSession::new("24.2.0");
    let mut handle = session.clone();
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    handle.exit().unwrap();

    let err = driver
        .try_set("setup/models/energy/enabled", json!(true), "setup")
        .unwrap_err();
    assert!(matches!(err, DriverError::Session(_)));
}

#[test]
fn version_gates() {
    let old = Driver::new(Box::new(OfflineSession::new("23.1.0")), false).unwrap();
    assert!(old.supports(Feature::PseudoTimeStep));
    assert!(!old.supports(Feature::EfficiencyProcessArgument));
    assert!(!old.supports(Feature::StructuredStudyCaseRead));
    assert!(Driver::new(Box::new(OfflineSession::new("garbage")), false).is_err());
}

#[test]
fn journal_written_on_exit() {
    let dir = tempfile::tempdir().unwrap();
    let session = OfflineSession::new("24.2.0");
    let journal = dir.path().join("caseA.jou");
    session.set_journal_file(&journal);
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    driver.rpsetvar("mp/copy-method", 1).unwrap();
    driver.exit().unwrap();

    let text = std::fs::read_to_string(journal).unwrap();
    assert!(text.contains("scheme (rpsetvar 'mp/copy-method 1)"));
    assert!(text.trim_end().ends_with("exit"));
}
