//! Turbo topologies for span-wise post-processing.

use crate::context::StageContext;
use crate::error::SetupResult;
use crate::interfaces::InterfaceSummary;
use serde_json::{Map, Value, json};
use tw_config::tree::string_list;

const DEFINE_TOPOLOGY: &str = "setup/turbo_models/turbo_topology/define_topology";

/// Topology field in the config and the matching argument of the solver call.
const ZONE_GROUPS: [(&str, &str); 5] = [
    ("tz_hub_names", "hub_names"),
    ("tz_shroud_names", "shroud_names"),
    ("tz_inlet_names", "inlet_names"),
    ("tz_outlet_names", "outlet_names"),
    ("tz_blade_names", "blade_names"),
];

fn list(entry: &Map<String, Value>, key: &str) -> Vec<String> {
    entry.get(key).map(string_list).unwrap_or_default()
}

/// Arguments of the topology builder for one entry.
///
/// With non-conformal periodics the solver wants the underlying zones as
/// theta-min/theta-max instead of the periodic interface names.
pub fn topology_args(name: &str, entry: &Map<String, Value>, interfaces: &InterfaceSummary) -> Value {
    let mut args = Map::new();
    args.insert("topology_name".to_string(), Value::from(name));
    for (config, arg) in ZONE_GROUPS {
        args.insert(arg.to_string(), json!(list(entry, config)));
    }

    let nonconformal: Vec<_> = interfaces.nonconformal_periodics().collect();
    let explicit_min = list(entry, "tz_theta_min_names");
    let explicit_max = list(entry, "tz_theta_max_names");
    if !explicit_min.is_empty() && !explicit_max.is_empty() {
        args.insert("theta_min_names".to_string(), json!(explicit_min));
        args.insert("theta_max_names".to_string(), json!(explicit_max));
    } else if !nonconformal.is_empty() {
        let min: Vec<&String> = nonconformal.iter().flat_map(|p| &p.side1).collect();
        let max: Vec<&String> = nonconformal.iter().flat_map(|p| &p.side2).collect();
        args.insert("theta_min_names".to_string(), json!(min));
        args.insert("theta_max_names".to_string(), json!(max));
    } else {
        args.insert(
            "theta_periodic_names".to_string(),
            json!(list(entry, "tz_theta_periodic_names")),
        );
    }
    Value::Object(args)
}

/// Define every configured topology; returns the names the solver accepted.
pub fn apply(ctx: &mut StageContext<'_>, interfaces: &InterfaceSummary) -> SetupResult<Vec<String>> {
    let key = "locations.tz_turbo_topology_names";
    let mut created = Vec::new();
    for (name, entry) in ctx.case.location_entries("tz_turbo_topology_names") {
        if list(&entry, "tz_hub_names").is_empty() || list(&entry, "tz_shroud_names").is_empty() {
            tracing::warn!(key, "topology '{name}' needs hub and shroud zones");
            continue;
        }
        let args = topology_args(&name, &entry, interfaces);
        if ctx.driver.try_invoke(DEFINE_TOPOLOGY, args, key)?.is_some() {
            created.push(name);
        }
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::PeriodicPair;

    fn entry() -> Map<String, Value> {
        json!({
            "tz_hub_names": ["hub"],
            "tz_shroud_names": ["shroud"],
            "tz_inlet_names": ["inflow"],
            "tz_outlet_names": ["outflow"],
            "tz_blade_names": ["blade"],
            "tz_theta_periodic_names": ["per1"]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn conformal_periodics_use_interface_names() {
        let args = topology_args("rotor", &entry(), &InterfaceSummary::default());
        assert_eq!(args["theta_periodic_names"], json!(["per1"]));
        assert!(args.get("theta_min_names").is_none());
    }

    #[test]
    fn nonconformal_periodics_use_sides() {
        let summary = InterfaceSummary {
            periodic: vec![PeriodicPair {
                name: "per1".into(),
                side1: vec!["per_a".into()],
                side2: vec!["per_b".into()],
                nonconformal: true,
            }],
            ..Default::default()
        };
        let args = topology_args("rotor", &entry(), &summary);
        assert_eq!(args["theta_min_names"], json!(["per_a"]));
        assert_eq!(args["theta_max_names"], json!(["per_b"]));
        assert!(args.get("theta_periodic_names").is_none());
    }
}
