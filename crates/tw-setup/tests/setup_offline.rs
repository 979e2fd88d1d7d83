use serde_json::{Map, Value, json};
use tw_config::Case;
use tw_driver::{Driver, OfflineSession};
use tw_setup::{CaseLayout, SetupRecipe, StageContext, run_setup};

fn case(body: Value) -> Case {
    let mut body: Map<String, Value> = body.as_object().cloned().unwrap();
    for section in tw_config::REQUIRED_SECTIONS {
        body.entry(section.to_string()).or_insert_with(|| json!({}));
    }
    Case::new("caseA", body)
}

fn pressure_ratio_case() -> Case {
    case(json!({
        "expressions": {
            "BC_pref": "101325 [Pa]",
            "BC_IN_pt": "120000 [Pa]",
            "BC_IN_Tt": "300 [K]",
            "BC_IN_p_gauge": "0 [Pa]",
            "BC_OUT_p": "0 [Pa]",
            "BC_omega": "100 [rad/s]"
        },
        "locations": {
            "bz_inlet_names": ["inflow"],
            "bz_outlet_names": ["outflow"],
            "cz_rotating_names": ["rotor"]
        },
        "solution": {
            "reportlist": ["MP_PRt"],
            "cov_list": ["MP_PRt"],
            "cov_crit": 1e-4,
            "iter_count": 5
        }
    }))
}

fn session(dir: &std::path::Path) -> OfflineSession {
    let session = OfflineSession::new("24.2.0");
    session.set_working_dir(dir);
    session.register_boundary_zone("inflow", "wall");
    session.register_boundary_zone("outflow", "wall");
    session.register_boundary_zone("hub", "wall");
    session.register_cell_zone("rotor");
    session
}

#[test]
fn pressure_ratio_case_setup() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = pressure_ratio_case();
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let outcome = run_setup(&mut ctx, SetupRecipe::Compressible).unwrap();

    assert_eq!(driver.zone_type("inflow").as_deref(), Some("pressure-inlet"));
    assert_eq!(driver.zone_type("outflow").as_deref(), Some("pressure-outlet"));
    assert!(!driver.exists("setup/boundary_conditions/mass_flow_inlet/inflow"));
    let frame = driver
        .get("setup/cell_zone_conditions/fluid/rotor/reference_frame")
        .unwrap();
    assert_eq!(frame["frame_motion"], json!(true));
    assert_eq!(frame["mrf_omega"], json!("BC_omega"));

    assert_eq!(outcome.reports.reports, vec!["rep-mp-prt".to_string()]);
    assert_eq!(outcome.reports.cov_reports, vec!["rep-mp-prt-cov".to_string()]);
    let cov = driver
        .get("solution/monitor/convergence_conditions/convergence_reports/rep-mp-prt-cov")
        .unwrap();
    assert_eq!(cov["previous_values_to_consider"], json!(50));
    assert!(outcome.expression_file.unwrap().exists());
    assert!(
        driver
            .get("setup/named_expressions/MP_PRt/output_parameter")
            .unwrap()
            .as_bool()
            .unwrap()
    );
    assert!(
        outcome.reports.report_file.unwrap().ends_with("caseA_report.out")
    );
    assert_eq!(
        driver.get("solution/monitor/convergence_conditions/condition").unwrap(),
        json!("all-conditions-are-met")
    );
}

#[test]
fn gpu_skips_cov_reports() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    let mut driver = Driver::new(Box::new(session), true).unwrap();
    let mut case = pressure_ratio_case();
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let outcome = run_setup(&mut ctx, SetupRecipe::Compressible).unwrap();
    assert!(outcome.reports.cov_reports.is_empty());
    assert!(!outcome.reports.reports.is_empty());
}

#[test]
fn bc_only_keeps_solver_energy() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = pressure_ratio_case();
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let outcome = run_setup(&mut ctx, SetupRecipe::BcOnly).unwrap();
    assert!(!outcome.energy);
    assert!(driver.exists("setup/materials/fluid/air"));
    assert!(!session.journal().iter().any(|l| l.contains("models/energy/enabled")));
}

#[test]
fn periodic_falls_back_to_passage_count() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    session.register_boundary_zone("per_a", "wall");
    session.register_boundary_zone("per_b", "wall");
    session.set_evaluation("GEO_ROT_No_Passages_360", 18.0);
    let mut driver = Driver::new(Box::new(session.clone()), false).unwrap();
    let mut case = case(json!({
        "locations": {
            "bz_interfaces_periodic_names": {
                "per1": {"side1": "per_a", "side2": "per_b"}
            }
        }
    }));
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let summary = tw_setup::interfaces::apply(&mut ctx).unwrap();
    assert_eq!(summary.periodic.len(), 1);
    assert!(!summary.periodic[0].nonconformal);
    let retry = session
        .journal()
        .into_iter()
        .filter(|l| l.starts_with("invoke setup/mesh_interfaces/make_periodic"))
        .last()
        .unwrap();
    assert!(retry.contains("20"));
}

#[test]
fn periodic_sides_in_general_interface_use_theta_min_max() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    session.register_boundary_zone("per_a", "wall");
    session.register_boundary_zone("per_b", "wall");
    session.register_boundary_zone("shroud", "wall");
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    let mut case = case(json!({
        "locations": {
            "bz_interfaces_periodic_names": {
                "per1": {"side1": "per_a", "side2": "per_b", "rotation_angle": 20}
            },
            "bz_interfaces_general_names": {
                "gi": {"side1": "per_a", "side2": "per_b"}
            },
            "tz_turbo_topology_names": {
                "rotor": {
                    "tz_hub_names": ["hub"],
                    "tz_shroud_names": ["shroud"],
                    "tz_theta_periodic_names": ["per1"]
                }
            }
        }
    }));
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let summary = tw_setup::interfaces::apply(&mut ctx).unwrap();
    assert_eq!(summary.general, vec!["gi".to_string()]);
    assert!(summary.periodic[0].nonconformal);

    let created = tw_setup::topology::apply(&mut ctx, &summary).unwrap();
    assert_eq!(created, vec!["rotor".to_string()]);
    let args = driver
        .get("setup/turbo_models/turbo_topology/rotor")
        .unwrap();
    assert_eq!(args["theta_min_names"], json!(["per_a"]));
    assert_eq!(args["theta_max_names"], json!(["per_b"]));
    assert!(args.get("theta_periodic_names").is_none());
}

#[test]
fn periodic_left_as_interface_zones_is_nonconformal() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    session.register_boundary_zone("per_a", "wall");
    session.register_boundary_zone("per_b", "wall");
    session.mark_nonconformal("per_a");
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    let mut case = case(json!({
        "locations": {
            "bz_interfaces_periodic_names": {
                "per1": {"side1": "per_a", "side2": "per_b", "rotation_angle": 20}
            }
        }
    }));
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let summary = tw_setup::interfaces::apply(&mut ctx).unwrap();
    assert!(summary.general.is_empty());
    assert!(summary.periodic[0].nonconformal);
}

#[test]
fn unknown_material_skips_case() {
    let dir = tempfile::tempdir().unwrap();
    let session = session(dir.path());
    let mut driver = Driver::new(Box::new(session), false).unwrap();
    let mut case = case(json!({"fluid_properties": "unobtainium"}));
    let layout = CaseLayout::new(dir.path(), case.name());
    let mut ctx = StageContext::new(&mut driver, &mut case, &layout);

    let err = run_setup(&mut ctx, SetupRecipe::Incompressible).unwrap_err();
    assert!(err.skips_case());
}
