//! Numerics recipes.

use crate::context::StageContext;
use crate::error::SetupResult;
use serde_json::Value;
use tw_driver::Feature;

const METHODS: &str = "solution/methods";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericsRecipe {
    Defaults,
    BpTn2305,
    BpTn2305Lsq,
    BpAll2305,
    DefaultsPseudoTimestep,
}

impl NumericsRecipe {
    pub const ALL: [NumericsRecipe; 5] = [
        Self::Defaults,
        Self::BpTn2305,
        Self::BpTn2305Lsq,
        Self::BpAll2305,
        Self::DefaultsPseudoTimestep,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Defaults => "numerics_defaults",
            Self::BpTn2305 => "numerics_bp_tn_2305",
            Self::BpTn2305Lsq => "numerics_bp_tn_2305_lsq",
            Self::BpAll2305 => "numerics_bp_all_2305",
            Self::DefaultsPseudoTimestep => "numerics_defaults_pseudo_timestep",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

pub fn apply(ctx: &mut StageContext<'_>, recipe: NumericsRecipe) -> SetupResult<()> {
    tracing::info!(case = ctx.case.name(), recipe = recipe.name(), "numerics");
    let key = "functions.numerics";
    match recipe {
        NumericsRecipe::Defaults => {}
        NumericsRecipe::BpTn2305 => {
            ctx.driver.set_enum(
                &format!("{METHODS}/gradient_scheme"),
                "green-gauss-node-based",
                key,
            )?;
            turbo_numerics(ctx)?;
        }
        NumericsRecipe::BpTn2305Lsq => {
            ctx.driver.set_enum(
                &format!("{METHODS}/gradient_scheme"),
                "least-square-cell-based",
                key,
            )?;
            turbo_numerics(ctx)?;
        }
        NumericsRecipe::BpAll2305 => {
            let schemes = format!("{METHODS}/spatial_discretization/discretization_scheme");
            let equations: Vec<String> = ctx
                .driver
                .get(&schemes)
                .ok()
                .and_then(|v| v.as_object().map(|m| m.keys().cloned().collect()))
                .unwrap_or_default();
            for equation in equations {
                let scheme = if equation == "pressure" {
                    "second-order"
                } else {
                    "second-order-upwind"
                };
                ctx.driver
                    .set_enum(&format!("{schemes}/{equation}"), scheme, key)?;
            }
            apply(ctx, NumericsRecipe::BpTn2305)?;
        }
        NumericsRecipe::DefaultsPseudoTimestep => {
            ctx.driver
                .set_enum(&format!("{METHODS}/p_v_coupling/flow_scheme"), "Coupled", key)?;
            ctx.driver.set_enum(
                &format!("{METHODS}/pseudo_time_method/formulation/coupled_solver"),
                "global-time-step",
                key,
            )?;
            turbo_numerics(ctx)?;
        }
    }
    Ok(())
}

/// Turbo-specific numerics, on by default; never on GPU.
fn turbo_numerics(ctx: &mut StageContext<'_>) -> SetupResult<()> {
    let key = "solution.tsn";
    let mut enabled = ctx.case.bool_or("solution", "tsn", true);
    if enabled && !ctx.driver.supports(Feature::TurboNumerics) {
        tracing::warn!(key, "turbo-specific numerics are not available on GPU, switched off");
        enabled = false;
    }
    ctx.driver.try_set(
        &format!("{METHODS}/turbo_numerics/enabled"),
        Value::from(enabled),
        key,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_names_round_trip() {
        for recipe in NumericsRecipe::ALL {
            assert_eq!(NumericsRecipe::from_name(recipe.name()), Some(recipe));
        }
        assert_eq!(NumericsRecipe::from_name("numerics_fast"), None);
    }
}
