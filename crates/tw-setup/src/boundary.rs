//! Boundary conditions driven by the location roles of a case.
//!
//! Which condition an inlet or outlet gets depends on which `BC_` expressions
//! the case defines. The selection functions are pure so they can be checked
//! without a solver; `apply` turns the selection into settings writes.

use crate::context::StageContext;
use crate::error::SetupResult;
use serde_json::{Value, json};
use std::path::Path;
use tw_config::Case;
use tw_driver::bc_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InletKind {
    MassFlow,
    VolumeFlow,
    TotalPressure,
}

impl InletKind {
    pub fn zone_type(&self) -> &'static str {
        match self {
            InletKind::MassFlow | InletKind::VolumeFlow => "mass-flow-inlet",
            InletKind::TotalPressure => "pressure-inlet",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutletKind {
    ExitCorrectedMassFlow,
    MassFlow,
    VolumeFlow,
    StaticPressure,
}

impl OutletKind {
    pub fn zone_type(&self) -> &'static str {
        match self {
            OutletKind::StaticPressure => "pressure-outlet",
            _ => "mass-flow-outlet",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InletDirection {
    Normal,
    Cylindrical,
    Cartesian,
    Profile(String),
}

pub fn inlet_kind(case: &Case) -> Option<InletKind> {
    if case.has_expression("BC_IN_MassFlow") {
        Some(InletKind::MassFlow)
    } else if case.has_expression("BC_IN_VolumeFlow")
        && case.has_expression("BC_IN_VolumeFlowDensity")
    {
        Some(InletKind::VolumeFlow)
    } else if case.has_expression("BC_IN_pt") {
        Some(InletKind::TotalPressure)
    } else {
        None
    }
}

pub fn outlet_kind(case: &Case) -> Option<OutletKind> {
    if case.has_expression("BC_OUT_ECMassFlow") {
        Some(OutletKind::ExitCorrectedMassFlow)
    } else if case.has_expression("BC_OUT_MassFlow") {
        Some(OutletKind::MassFlow)
    } else if case.has_expression("BC_OUT_VolumeFlow")
        && case.has_expression("BC_OUT_VolumeFlowDensity")
    {
        Some(OutletKind::VolumeFlow)
    } else if case.has_expression("BC_OUT_p") {
        Some(OutletKind::StaticPressure)
    } else {
        None
    }
}

fn all_expressions(case: &Case, names: [&str; 3]) -> bool {
    names.iter().all(|n| case.has_expression(n))
}

pub fn inlet_direction(case: &Case, profile: Option<&str>) -> InletDirection {
    if let Some(p) = profile {
        InletDirection::Profile(p.to_string())
    } else if all_expressions(case, ["BC_IN_radDir", "BC_IN_tangDir", "BC_IN_axDir"]) {
        InletDirection::Cylindrical
    } else if all_expressions(case, ["BC_IN_xDir", "BC_IN_yDir", "BC_IN_zDir"]) {
        InletDirection::Cartesian
    } else {
        InletDirection::Normal
    }
}

/// Profile name inside the solver: the file stem of the configured profile.
pub fn profile_name(case: &Case, key: &str) -> Option<String> {
    case.text(key).map(|file| {
        Path::new(&file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file)
            .to_string()
    })
}

fn profile_field(profile: &str, field: &str) -> Value {
    json!({"option": "profile", "profile_name": profile, "field_name": field})
}

struct Bc<'c, 'a> {
    ctx: &'c mut StageContext<'a>,
    base: String,
    key: &'static str,
}

impl Bc<'_, '_> {
    fn set(&mut self, field: &str, value: impl Into<Value>) -> SetupResult<bool> {
        Ok(self
            .ctx
            .driver
            .try_set(&format!("{}/{field}", self.base), value.into(), self.key)?)
    }

    fn choose(&mut self, field: &str, value: &str) -> SetupResult<bool> {
        Ok(self
            .ctx
            .driver
            .set_enum(&format!("{}/{field}", self.base), value, self.key)?)
    }
}

pub fn apply(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    apply_inlets(ctx, energy)?;
    apply_outlets(ctx, energy)?;
    apply_walls(ctx)?;
    Ok(())
}

fn apply_inlets(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    let zones = ctx.case.location_list("bz_inlet_names");
    if zones.is_empty() {
        return Ok(());
    }
    let Some(kind) = inlet_kind(ctx.case) else {
        tracing::warn!(key = "expressions", "no inlet condition defined (BC_IN_MassFlow, BC_IN_VolumeFlow or BC_IN_pt)");
        return Ok(());
    };
    let profile = profile_name(ctx.case, "profileName");
    let reverse = ctx.case.bool_or("setup", "BC_IN_reverse", false);
    let has_gauge = ctx.case.has_expression("BC_IN_p_gauge");
    let has_tt = ctx.case.has_expression("BC_IN_Tt");
    let direction = inlet_direction(ctx.case, profile.as_deref());
    let tu = ctx.case.has_expression("BC_IN_TuIn");
    let tvr = ctx.case.has_expression("BC_IN_TuVR");

    if !ctx
        .driver
        .set_zone_type(&zones, kind.zone_type(), "locations.bz_inlet_names")?
    {
        return Ok(());
    }
    if energy && !has_tt {
        tracing::warn!(key = "expressions.BC_IN_Tt", "energy is on but no inlet total temperature is defined");
    }

    for zone in &zones {
        let mut bc = Bc {
            base: bc_path(kind.zone_type(), zone),
            ctx: &mut *ctx,
            key: "locations.bz_inlet_names",
        };
        match kind {
            InletKind::MassFlow => {
                bc.set("momentum/mass_flow_specification", "Mass Flow Rate")?;
                bc.set("momentum/mass_flow_rate", "BC_IN_MassFlow")?;
            }
            InletKind::VolumeFlow => {
                bc.set("momentum/mass_flow_specification", "Mass Flow Rate")?;
                bc.set(
                    "momentum/mass_flow_rate",
                    "BC_IN_VolumeFlow*BC_IN_VolumeFlowDensity",
                )?;
            }
            InletKind::TotalPressure => {
                match &profile {
                    Some(p) => bc.set("momentum/gauge_total_pressure", profile_field(p, "pt-in"))?,
                    None => bc.set("momentum/gauge_total_pressure", "BC_IN_pt")?,
                };
                bc.key = "setup.BC_IN_reverse";
                bc.set("momentum/prevent_reverse_flow", reverse)?;
                bc.key = "locations.bz_inlet_names";
            }
        }
        if has_gauge {
            bc.set("momentum/supersonic_or_initial_gauge_pressure", "BC_IN_p_gauge")?;
        }
        if energy && has_tt {
            match (&profile, kind) {
                (Some(p), InletKind::TotalPressure) => {
                    bc.set("thermal/total_temperature", profile_field(p, "tt-in"))?
                }
                _ => bc.set("thermal/total_temperature", "BC_IN_Tt")?,
            };
        }

        match &direction {
            InletDirection::Normal => {
                bc.set("momentum/direction_specification_method", "Normal to Boundary")?;
            }
            InletDirection::Cylindrical => {
                bc.set("momentum/direction_specification_method", "Direction Vector")?;
                bc.set(
                    "momentum/coordinate_system",
                    "Cylindrical (Radial, Tangential, Axial)",
                )?;
                bc.set(
                    "momentum/flow_direction",
                    json!(["BC_IN_radDir", "BC_IN_tangDir", "BC_IN_axDir"]),
                )?;
            }
            InletDirection::Cartesian => {
                bc.set("momentum/direction_specification_method", "Direction Vector")?;
                bc.set("momentum/coordinate_system", "Cartesian (X, Y, Z)")?;
                bc.set(
                    "momentum/flow_direction",
                    json!(["BC_IN_xDir", "BC_IN_yDir", "BC_IN_zDir"]),
                )?;
            }
            InletDirection::Profile(p) => {
                bc.set("momentum/direction_specification_method", "Direction Vector")?;
                bc.set(
                    "momentum/coordinate_system",
                    "Cylindrical (Radial, Tangential, Axial)",
                )?;
                bc.set(
                    "momentum/flow_direction",
                    json!([
                        profile_field(p, "radDir-in"),
                        profile_field(p, "tangDir-in"),
                        profile_field(p, "axDir-in")
                    ]),
                )?;
            }
        }

        if tu {
            bc.key = "expressions.BC_IN_TuIn";
            bc.set(
                "turbulence/turbulent_specification",
                "Intensity and Viscosity Ratio",
            )?;
            bc.set("turbulence/turbulent_intensity", "BC_IN_TuIn")?;
            if tvr {
                bc.set("turbulence/turbulent_viscosity_ratio", "BC_IN_TuVR")?;
            }
        }
    }
    tracing::info!(kind = kind.zone_type(), zones = zones.len(), "inlets set");
    Ok(())
}

fn apply_outlets(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    let zones = ctx.case.location_list("bz_outlet_names");
    if zones.is_empty() {
        return Ok(());
    }
    let Some(kind) = outlet_kind(ctx.case) else {
        tracing::warn!(key = "expressions", "no outlet condition defined (BC_OUT_ECMassFlow, BC_OUT_MassFlow, BC_OUT_VolumeFlow or BC_OUT_p)");
        return Ok(());
    };
    let profile = profile_name(ctx.case, "profileNameOut");
    let avg_p = ctx.case.bool_or("setup", "BC_OUT_avg_p", true);
    let reverse = ctx.case.bool_or("setup", "BC_OUT_reverse", true);
    let blending = ctx.case.f64_in("setup", "blending_factor");
    let bins = ctx.case.f64_in("setup", "bin_count");
    let ec_pres = if ctx.case.has_expression("BC_OUT_ECref_Pres") {
        "BC_OUT_ECref_Pres"
    } else {
        "BC_IN_pt"
    };
    let ec_temp = if ctx.case.has_expression("BC_OUT_ECref_Temp") {
        "BC_OUT_ECref_Temp"
    } else {
        "BC_IN_Tt"
    };

    if !ctx
        .driver
        .set_zone_type(&zones, kind.zone_type(), "locations.bz_outlet_names")?
    {
        return Ok(());
    }

    for zone in &zones {
        let mut bc = Bc {
            base: bc_path(kind.zone_type(), zone),
            ctx: &mut *ctx,
            key: "locations.bz_outlet_names",
        };
        match kind {
            OutletKind::ExitCorrectedMassFlow => {
                bc.set("momentum/flow_spec", "Exit Corrected Mass Flow Rate")?;
                bc.set("momentum/exit_corrected_mass_flow_rate", "BC_OUT_ECMassFlow")?;
                bc.set("momentum/exit_corrected_reference_pressure", ec_pres)?;
                bc.set("momentum/exit_corrected_reference_temperature", ec_temp)?;
            }
            OutletKind::MassFlow => {
                bc.set("momentum/flow_spec", "Mass Flow Rate")?;
                bc.set("momentum/mass_flow_rate", "BC_OUT_MassFlow")?;
            }
            OutletKind::VolumeFlow => {
                bc.set("momentum/flow_spec", "Mass Flow Rate")?;
                bc.set(
                    "momentum/mass_flow_rate",
                    "BC_OUT_VolumeFlow*BC_OUT_VolumeFlowDensity",
                )?;
            }
            OutletKind::StaticPressure => {
                match &profile {
                    Some(p) => bc.set("momentum/gauge_pressure", profile_field(p, "p-out"))?,
                    None => bc.set("momentum/gauge_pressure", "BC_OUT_p")?,
                };
                bc.key = "setup.BC_OUT_avg_p";
                bc.set("momentum/avg_press_spec", avg_p)?;
                bc.key = "setup.BC_OUT_reverse";
                bc.set("momentum/prevent_reverse_flow", reverse)?;
                if let Some(b) = blending {
                    bc.key = "setup.blending_factor";
                    bc.set("momentum/avg_option_blending_factor", b)?;
                }
                if let Some(n) = bins {
                    bc.key = "setup.bin_count";
                    bc.set("momentum/avg_option_bins", n.round() as i64)?;
                }
            }
        }
        if energy && kind == OutletKind::StaticPressure && bc.ctx.case.has_expression("BC_IN_Tt") {
            bc.key = "expressions.BC_IN_Tt";
            bc.set("thermal/backflow_total_temperature", "BC_IN_Tt")?;
        }
    }
    tracing::info!(kind = kind.zone_type(), zones = zones.len(), "outlets set");
    Ok(())
}

fn apply_walls(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let origin = ctx
        .case
        .f64_list_or("setup", "rotation_axis_origin", &[0.0, 0.0, 0.0]);
    let direction = ctx
        .case
        .f64_list_or("setup", "rotation_axis_direction", &[0.0, 0.0, 1.0]);

    let walls = ctx.case.location_list("bz_walls");
    ctx.driver.set_zone_type(&walls, "wall", "locations.bz_walls")?;

    for (role, speed) in [
        ("bz_walls_rotating_names", "BC_omega"),
        ("bz_walls_counterrotating_names", "0 [rad/s]"),
    ] {
        let zones = ctx.case.location_list(role);
        if zones.is_empty() {
            continue;
        }
        let key = if role == "bz_walls_rotating_names" {
            "locations.bz_walls_rotating_names"
        } else {
            "locations.bz_walls_counterrotating_names"
        };
        if speed == "BC_omega" && !ctx.case.has_expression("BC_omega") {
            tracing::warn!(key = "expressions.BC_omega", "rotating walls need BC_omega, left stationary");
            ctx.driver.set_zone_type(&zones, "wall", key)?;
            continue;
        }
        if !ctx.driver.set_zone_type(&zones, "wall", key)? {
            continue;
        }
        for zone in &zones {
            let mut bc = Bc {
                base: bc_path("wall", zone),
                ctx: &mut *ctx,
                key,
            };
            bc.set("momentum/wall_motion", "Moving Wall")?;
            bc.set("momentum/relative", false)?;
            bc.set("momentum/rotating", true)?;
            bc.set("momentum/rotation_speed", speed)?;
            bc.set("momentum/rotation_axis_origin", json!(origin))?;
            bc.set("momentum/rotation_axis_direction", json!(direction))?;
        }
    }

    let freeslip = ctx.case.location_list("bz_walls_freeslip_names");
    if ctx
        .driver
        .set_zone_type(&freeslip, "wall", "locations.bz_walls_freeslip_names")?
    {
        for zone in &freeslip {
            let mut bc = Bc {
                base: bc_path("wall", zone),
                ctx: &mut *ctx,
                key: "locations.bz_walls_freeslip_names",
            };
            if bc.choose("momentum/shear_condition", "Specified Shear")? {
                bc.set("momentum/shear_stress", json!([0.0, 0.0, 0.0]))?;
            }
        }
    }

    let symmetry = ctx.case.location_list("bz_symmetry_names");
    ctx.driver
        .set_zone_type(&symmetry, "symmetry", "locations.bz_symmetry_names")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn case(expressions: Value) -> Case {
        let mut body = Map::new();
        body.insert("expressions".into(), expressions);
        Case::new("c", body)
    }

    #[test]
    fn inlet_priority() {
        let c = case(json!({"BC_IN_MassFlow": "1 [kg/s]", "BC_IN_pt": "1 [Pa]"}));
        assert_eq!(inlet_kind(&c), Some(InletKind::MassFlow));
        let c = case(json!({"BC_IN_VolumeFlow": "1 [m^3/s]", "BC_IN_pt": "1 [Pa]"}));
        assert_eq!(inlet_kind(&c), Some(InletKind::TotalPressure));
        let c = case(json!({}));
        assert_eq!(inlet_kind(&c), None);
    }

    #[test]
    fn outlet_priority() {
        let c = case(json!({"BC_OUT_p": "0 [Pa]", "BC_OUT_ECMassFlow": "2 [kg/s]"}));
        assert_eq!(outlet_kind(&c), Some(OutletKind::ExitCorrectedMassFlow));
        let c = case(json!({"BC_OUT_p": "0 [Pa]"}));
        assert_eq!(outlet_kind(&c).map(|k| k.zone_type()), Some("pressure-outlet"));
    }

    #[test]
    fn direction_selection() {
        let c = case(json!({"BC_IN_radDir": "0", "BC_IN_tangDir": "0", "BC_IN_axDir": "1"}));
        assert_eq!(inlet_direction(&c, None), InletDirection::Cylindrical);
        assert_eq!(
            inlet_direction(&c, Some("inlet_profile")),
            InletDirection::Profile("inlet_profile".into())
        );
        let c = case(json!({"BC_IN_xDir": "0", "BC_IN_yDir": "0"}));
        assert_eq!(inlet_direction(&c, None), InletDirection::Normal);
    }
}
