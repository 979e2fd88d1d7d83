//! Reference frames of the fluid cell zones.

use crate::context::StageContext;
use crate::error::SetupResult;
use serde_json::{Value, json};
use tw_driver::cell_zone_path;

fn axis(ctx: &mut StageContext<'_>, key: &str, default: [f64; 3]) -> Vec<f64> {
    let v = ctx.case.f64_list_or("setup", key, &default);
    if v.len() == 3 {
        v
    } else {
        tracing::warn!(key = %format!("setup.{key}"), "needs three components, using {default:?}");
        default.to_vec()
    }
}

pub fn apply(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let origin = axis(ctx, "rotation_axis_origin", [0.0, 0.0, 0.0]);
    let direction = axis(ctx, "rotation_axis_direction", [0.0, 0.0, 1.0]);
    let rotating = ctx.case.location_list("cz_rotating_names");
    let zones = ctx.driver.cell_zones();

    for missing in rotating.iter().filter(|z| !zones.contains(z)) {
        tracing::warn!(key = "locations.cz_rotating_names", "cell zone '{missing}' not found");
    }
    let has_omega = ctx.case.has_expression("BC_omega");

    for zone in &zones {
        let frame = format!("{}/reference_frame", cell_zone_path(zone));
        ctx.driver.try_set(
            &format!("{frame}/reference_frame_axis_origin"),
            json!(origin),
            "setup.rotation_axis_origin",
        )?;
        ctx.driver.try_set(
            &format!("{frame}/reference_frame_axis_direction"),
            json!(direction),
            "setup.rotation_axis_direction",
        )?;
        if !rotating.contains(zone) {
            continue;
        }
        if !has_omega {
            tracing::warn!(key = "expressions.BC_omega", "rotating zone '{zone}' needs BC_omega, left stationary");
            continue;
        }
        if ctx.driver.try_set(
            &format!("{frame}/frame_motion"),
            Value::from(true),
            "locations.cz_rotating_names",
        )? {
            ctx.driver.try_set(
                &format!("{frame}/mrf_omega"),
                Value::from("BC_omega"),
                "expressions.BC_omega",
            )?;
        }
    }
    Ok(())
}
