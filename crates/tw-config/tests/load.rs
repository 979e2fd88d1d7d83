use serde_json::json;
use std::fs;
use tw_config::{ConfigError, REQUIRED_SECTIONS, load_config, validate_config};

fn write(dir: &std::path::Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn json_config_gets_working_dir_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "turboSetupConfig.json",
        r#"{"cases": {"caseA": {"expressions": {"BC_omega": "100 [rad/s]"}}}}"#,
    );
    let config = load_config(&path).unwrap();
    assert_eq!(
        config.working_dir(),
        std::path::absolute(dir.path()).unwrap()
    );
    assert_eq!(config.debug_level(), 1);
    assert!(config.root().contains_key("ptw_version"));
    assert_eq!(config.case_names(), vec!["caseA"]);
}

#[test]
fn yaml_config_preserves_case_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "setup.yaml",
        "cases:\n  zeta: {}\n  alpha: {}\n  mid: {}\nlaunching:\n  noCore: 16\n",
    );
    let config = load_config(&path).unwrap();
    assert_eq!(config.case_names(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(config.launching().no_core, 16);
}

#[test]
fn missing_sections_load_as_empty_mappings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "bare.json", r#"{"launching": {"noCore": 2}}"#);
    let config = load_config(&path).unwrap();
    for key in ["cases", "studies", "functions"] {
        assert_eq!(config.root()[key], json!({}));
    }
    assert!(config.cases().unwrap().is_empty());
    assert!(config.study_names().is_empty());
    assert!(config.global_functions().is_empty());
    assert!(validate_config(&config).is_empty());
    assert!(matches!(
        config.resolve_case("caseA"),
        Err(ConfigError::CaseNotFound(name)) if name == "caseA"
    ));
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "setup.toml", "cases = {}");
    assert!(load_config(&path).is_err());
}

#[test]
fn ref_case_overlay_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "cfg.json",
        &json!({
            "cases": {
                "baseCase": {"setup": {"BC_OUT_reverse": true}},
                "derived": {"refCase": "baseCase", "setup": {"BC_OUT_reverse": false}}
            }
        })
        .to_string(),
    );
    let config = load_config(&path).unwrap();
    let derived = config.resolve_case("derived").unwrap();
    assert_eq!(
        derived.lookup("setup", "BC_OUT_reverse"),
        Some(&json!(false))
    );
}

#[test]
fn ref_case_resolution_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "cfg.json",
        &json!({
            "cases": {
                "R": {"expressions": {"BC_IN_pt": "1 [bar]"}, "solution": {"iter_count": 10}},
                "C": {"refCase": "R", "results": {"span_plot_height": [0.5]}}
            }
        })
        .to_string(),
    );
    let mut config = load_config(&path).unwrap();
    let first = config.resolve_case("C").unwrap();
    config.store_case(&first);
    let second = config.resolve_case("C").unwrap();
    assert_eq!(first.body(), second.body());
}

#[test]
fn debug_dump_reload_reproduces_enriched_tree() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "cfg.json",
        &json!({"cases": {"caseA": {"solution": {"cov_list": ["MP_PRt"]}}}}).to_string(),
    );
    let mut config = load_config(&path).unwrap();
    let mut case = config.resolve_case("caseA").unwrap();
    case.f64_or("solution", "cov_crit", 1e-4);
    config.store_case(&case);
    let dump = config.write_debug_dump().unwrap();

    let reloaded = load_config(&dump).unwrap();
    let again = reloaded.resolve_case("caseA").unwrap();
    assert_eq!(again.body(), case.body());
    for section in REQUIRED_SECTIONS {
        assert!(again.body().contains_key(section));
    }
    assert_eq!(reloaded.root()["cases"], config.root()["cases"]);
}

#[test]
fn unknown_top_level_keys_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "cfg.json",
        r#"{"cases": {}, "casse": {}, "launching": {"gpu": false, "gpus": 2}}"#,
    );
    let config = load_config(&path).unwrap();
    assert_eq!(config.unused_top_level_keys(), vec!["casse"]);
    assert_eq!(config.unused_launching_keys(), vec!["launching.gpus"]);
}

#[test]
fn validation_reports_missing_ref_case_and_bad_study() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "cfg.json",
        &json!({
            "cases": {"orphan": {"refCase": "ghost"}},
            "studies": {"s1": {"refCaseFilename": "x", "definition": [
                {"inputparameters": ["BC_omega"], "valueList": [[1.0], [2.0]]}
            ]}}
        })
        .to_string(),
    );
    let config = load_config(&path).unwrap();
    let issues = validate_config(&config);
    let owners: Vec<_> = issues.iter().map(|(owner, _)| owner.as_str()).collect();
    assert_eq!(owners, vec!["orphan", "s1"]);
}
