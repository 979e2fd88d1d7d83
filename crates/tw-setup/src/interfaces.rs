//! Zone interfaces. Periodic pairs go first, then general interfaces, then
//! the turbo flavours; creating general interfaces earlier would make the
//! solver treat the periodic sides as non-conformal.

use crate::context::StageContext;
use crate::error::SetupResult;
use serde_json::{Map, Value, json};
use std::collections::BTreeSet;
use tw_config::tree::{as_f64, f64_list, string_list};
use tw_driver::Feature;

const MAKE_PERIODIC: &str = "setup/mesh_interfaces/make_periodic";
const CREATE_INTERFACE: &str = "setup/mesh_interfaces/create";
const TURBO_CREATE: &str = "setup/mesh_interfaces/turbo_create";

/// Turbo interface roles and the solver's name for each flavour.
pub const TURBO_ROLES: [(&str, &str); 3] = [
    ("bz_interfaces_mixingplane_names", "mixing-plane"),
    ("bz_interfaces_no_pitchscale_names", "no-pitch-scale"),
    ("bz_interfaces_pitchscale_names", "pitch-scale"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum PeriodicMode {
    /// Rotational; `None` lets the solver detect the angle.
    Rotational(Option<f64>),
    Translational([f64; 3]),
}

/// How a periodic entry wants to be created.
pub fn periodic_mode(entry: &Map<String, Value>) -> PeriodicMode {
    if let Some(angle) = entry.get("rotation_angle").and_then(as_f64) {
        return PeriodicMode::Rotational(Some(angle));
    }
    if let Some(offset) = entry.get("translation").and_then(f64_list) {
        if let [x, y, z] = offset[..] {
            return PeriodicMode::Translational([x, y, z]);
        }
        tracing::warn!(key = "locations.bz_interfaces_periodic_names", "translation needs three components, treating as rotational");
    }
    PeriodicMode::Rotational(None)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodicPair {
    pub name: String,
    pub side1: Vec<String>,
    pub side2: Vec<String>,
    /// Both sides were also used by general interfaces.
    pub nonconformal: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterfaceSummary {
    pub periodic: Vec<PeriodicPair>,
    pub general: Vec<String>,
    pub turbo: Vec<String>,
}

impl InterfaceSummary {
    pub fn nonconformal_periodics(&self) -> impl Iterator<Item = &PeriodicPair> {
        self.periodic.iter().filter(|p| p.nonconformal)
    }
}

fn sides(entry: &Map<String, Value>) -> (Vec<String>, Vec<String>) {
    (
        entry.get("side1").map(string_list).unwrap_or_default(),
        entry.get("side2").map(string_list).unwrap_or_default(),
    )
}

pub fn apply(ctx: &mut StageContext<'_>) -> SetupResult<InterfaceSummary> {
    let mut summary = InterfaceSummary::default();
    apply_periodic(ctx, &mut summary)?;
    let general_sides = apply_general(ctx, &mut summary)?;
    flag_nonconformal(ctx, &mut summary, &general_sides);
    apply_turbo(ctx, &mut summary)?;
    Ok(summary)
}

/// A periodic pair whose zones all sit in general interfaces afterwards is
/// non-conformal.
fn flag_nonconformal(
    ctx: &StageContext<'_>,
    summary: &mut InterfaceSummary,
    general_sides: &BTreeSet<String>,
) {
    for pair in &mut summary.periodic {
        pair.nonconformal = pair.side1.iter().chain(&pair.side2).all(|z| {
            general_sides.contains(z) || ctx.driver.zone_type(z).as_deref() == Some("interface")
        });
        if pair.nonconformal {
            tracing::info!(
                key = "locations.bz_interfaces_periodic_names",
                "periodic '{}' is non-conformal",
                pair.name
            );
        }
    }
}

fn fallback_angle(ctx: &mut StageContext<'_>) -> Option<f64> {
    let passages = match ctx.driver.expression_value("GEO_ROT_No_Passages_360") {
        Ok(v) => v.as_f64(),
        Err(_) => ctx
            .case
            .expression("GEO_ROT_No_Passages_360")
            .and_then(|d| tw_core::Literal::parse(&d).ok())
            .map(|l| l.value),
    }?;
    (passages > 0.0).then(|| 360.0 / passages)
}

fn apply_periodic(ctx: &mut StageContext<'_>, summary: &mut InterfaceSummary) -> SetupResult<()> {
    let key = "locations.bz_interfaces_periodic_names";
    let entries = ctx.case.location_entries("bz_interfaces_periodic_names");
    let mut paired: BTreeSet<String> = ctx
        .driver
        .boundary_zones()
        .into_iter()
        .filter(|(_, kind)| kind == "periodic")
        .map(|(zone, _)| zone)
        .collect();

    for (name, entry) in entries {
        let (side1, side2) = sides(&entry);
        if side1.is_empty() || side1.len() != side2.len() {
            tracing::warn!(key, "periodic '{name}' needs side1 and side2 of equal length");
            continue;
        }
        if let Some(taken) = side1.iter().chain(&side2).find(|z| paired.contains(*z)) {
            tracing::warn!(key, "periodic '{name}' skipped, '{taken}' already belongs to a periodic pair");
            continue;
        }

        let mode = periodic_mode(&entry);
        let mut created = true;
        for (a, b) in side1.iter().zip(&side2) {
            let mut args = json!({
                "zone_name": a,
                "shadow_zone_name": b,
                "create_periodic": true,
                "rotate_periodic": !matches!(mode, PeriodicMode::Translational(_)),
            });
            match mode {
                PeriodicMode::Rotational(Some(angle)) => args["angle"] = json!(angle),
                PeriodicMode::Translational(offset) => args["offset"] = json!(offset),
                PeriodicMode::Rotational(None) => {}
            }
            if ctx.driver.try_invoke(MAKE_PERIODIC, args.clone(), key)?.is_some() {
                continue;
            }
            if mode != PeriodicMode::Rotational(None) {
                created = false;
                continue;
            }
            match fallback_angle(ctx) {
                Some(angle) => {
                    tracing::warn!(key = "expressions.GEO_ROT_No_Passages_360", "angle detection failed for '{name}', using {angle} deg");
                    args["angle"] = json!(angle);
                    if ctx.driver.try_invoke(MAKE_PERIODIC, args, key)?.is_none() {
                        created = false;
                    }
                }
                None => {
                    tracing::warn!(key = "expressions.GEO_ROT_No_Passages_360", "angle detection failed for '{name}' and no passage count is defined");
                    created = false;
                }
            }
        }
        if !created {
            continue;
        }

        paired.extend(side1.iter().cloned());
        paired.extend(side2.iter().cloned());
        summary.periodic.push(PeriodicPair {
            name,
            side1,
            side2,
            nonconformal: false,
        });
    }
    Ok(())
}

/// Returns the zones of every general interface the solver accepted.
fn apply_general(
    ctx: &mut StageContext<'_>,
    summary: &mut InterfaceSummary,
) -> SetupResult<BTreeSet<String>> {
    let key = "locations.bz_interfaces_general_names";
    let entries = ctx.case.location_entries("bz_interfaces_general_names");
    let turbo = ctx.driver.supports(Feature::TurboGeneralInterfaces);
    let mut used = BTreeSet::new();

    for (index, (name, entry)) in entries.into_iter().enumerate() {
        let (side1, side2) = sides(&entry);
        if side1.is_empty() || side2.is_empty() {
            tracing::warn!(key, "interface '{name}' needs side1 and side2");
            continue;
        }
        let created = if turbo {
            ctx.driver.try_invoke(
                TURBO_CREATE,
                json!({
                    "interface_name": name,
                    "zone1_list": side1,
                    "zone2_list": side2,
                    "turbo_choice": "general",
                }),
                key,
            )?
        } else {
            let mut args = json!({"name": name, "zone1_list": side1, "zone2_list": side2});
            // the solver asks about non-overlapping zones on the first one only
            if index == 0 {
                args["non_overlapping_zones"] = json!(true);
                args["mapped"] = json!(false);
            }
            ctx.driver.try_invoke(CREATE_INTERFACE, args, key)?
        };
        if created.is_some() {
            used.extend(side1);
            used.extend(side2);
            summary.general.push(name);
        }
    }
    Ok(used)
}

fn apply_turbo(ctx: &mut StageContext<'_>, summary: &mut InterfaceSummary) -> SetupResult<()> {
    for (role, choice) in TURBO_ROLES {
        let entries = ctx.case.location_entries(role);
        if entries.is_empty() {
            continue;
        }
        let key = format!("locations.{role}");
        if !ctx.driver.supports(Feature::MixingPlaneInterfaces) {
            tracing::error!(key = %key, "{choice} interfaces are not supported on GPU, skipped");
            continue;
        }
        for (name, entry) in entries {
            let (side1, side2) = sides(&entry);
            if side1.is_empty() || side2.is_empty() {
                tracing::warn!(key = %key, "interface '{name}' needs side1 and side2");
                continue;
            }
            let created = ctx.driver.try_invoke(
                TURBO_CREATE,
                json!({
                    "interface_name": name,
                    "zone1_list": side1,
                    "zone2_list": side2,
                    "turbo_choice": choice,
                }),
                &key,
            )?;
            if created.is_some() {
                summary.turbo.push(name);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn periodic_modes() {
        assert_eq!(
            periodic_mode(&entry(json!({"side1": "a", "side2": "b", "rotation_angle": 20}))),
            PeriodicMode::Rotational(Some(20.0))
        );
        assert_eq!(
            periodic_mode(&entry(json!({"translation": [0, 0.1, 0]}))),
            PeriodicMode::Translational([0.0, 0.1, 0.0])
        );
        assert_eq!(
            periodic_mode(&entry(json!({"side1": "a"}))),
            PeriodicMode::Rotational(None)
        );
    }
}
