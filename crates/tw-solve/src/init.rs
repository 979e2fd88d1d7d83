//! Initialization recipes.

use crate::SolveResult;
use serde_json::{Value, json};
use tw_driver::Feature;
use tw_setup::StageContext;

const INITIALIZATION: &str = "solution/initialization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitRecipe {
    Standard01,
    Standard02,
    Hybrid01,
    Fmg01,
    Fmg02,
    Fmg03,
}

impl InitRecipe {
    pub const ALL: [InitRecipe; 6] = [
        Self::Standard01,
        Self::Standard02,
        Self::Hybrid01,
        Self::Fmg01,
        Self::Fmg02,
        Self::Fmg03,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Standard01 => "init_standard_01",
            Self::Standard02 => "init_standard_02",
            Self::Hybrid01 => "init_hybrid_01",
            Self::Fmg01 => "init_fmg_01",
            Self::Fmg02 => "init_fmg_02",
            Self::Fmg03 => "init_fmg_03",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    pub fn gpu_supported(&self) -> bool {
        matches!(self, Self::Standard01 | Self::Hybrid01)
    }

    /// Recipe an FMG initialization starts from.
    pub fn fmg_base(&self) -> Option<InitRecipe> {
        match self {
            Self::Fmg01 => Some(Self::Standard01),
            Self::Fmg02 => Some(Self::Standard02),
            Self::Fmg03 => Some(Self::Hybrid01),
            _ => None,
        }
    }

    /// Pick the recipe to run for `name`; unknown names and recipes the
    /// hardware cannot run fall back to `init_standard_01`.
    pub fn select(name: &str, gpu: bool) -> InitRecipe {
        match Self::from_name(name) {
            Some(recipe) if gpu && !recipe.gpu_supported() => {
                tracing::warn!(key = "functions.initialization", "{name} is not supported on GPU, using init_standard_01");
                Self::Standard01
            }
            Some(recipe) => recipe,
            None => {
                tracing::warn!(key = "functions.initialization", "unknown initialization '{name}', using init_standard_01");
                Self::Standard01
            }
        }
    }
}

fn standard_initialize(ctx: &mut StageContext<'_>, key: &str) -> SolveResult<()> {
    ctx.driver
        .try_invoke(&format!("{INITIALIZATION}/standard_initialize"), Value::Null, key)?;
    Ok(())
}

/// Arguments of `compute_defaults`: the first mass-flow inlet, else the first
/// pressure inlet, else all zones.
pub fn compute_defaults_args(boundary_zones: &[(String, String)]) -> Value {
    for kind in ["mass-flow-inlet", "pressure-inlet"] {
        if let Some((zone, _)) = boundary_zones.iter().find(|(_, k)| k == kind) {
            return json!({"from_zone_type": kind, "from_zone_name": zone});
        }
    }
    json!({"all_zones": true})
}

pub fn initialize(ctx: &mut StageContext<'_>, recipe: InitRecipe) -> SolveResult<()> {
    tracing::info!(case = ctx.case.name(), recipe = recipe.name(), "initialization");
    if ctx.case.bool_or("solution", "reorder_domain", true) {
        ctx.driver
            .try_tui("/mesh/reorder/reorder-domain", "solution.reorder_domain")?;
    }
    run_recipe(ctx, recipe)
}

fn run_recipe(ctx: &mut StageContext<'_>, recipe: InitRecipe) -> SolveResult<()> {
    let key = "functions.initialization";
    match recipe {
        InitRecipe::Standard01 => {
            ctx.driver.set_enum(
                &format!("{INITIALIZATION}/reference_frame"),
                "absolute",
                key,
            )?;
            // field data must exist before density-dependent defaults
            standard_initialize(ctx, key)?;
            let args = compute_defaults_args(&ctx.driver.boundary_zones());
            ctx.driver
                .try_invoke(&format!("{INITIALIZATION}/compute_defaults"), args, key)?;
            standard_initialize(ctx, key)?;
        }
        InitRecipe::Standard02 => {
            ctx.driver.set_enum(
                &format!("{INITIALIZATION}/reference_frame"),
                "relative",
                key,
            )?;
            let defaults = format!("{INITIALIZATION}/defaults");
            let mut seeds = vec![
                ("k", json!(0.01)),
                ("omega", json!(0.01)),
                ("x-velocity", json!(0)),
                ("y-velocity", json!(0)),
                ("z-velocity", json!(0)),
            ];
            if ctx.case.has_expression("BC_IN_p_gauge") {
                seeds.push(("pressure", json!("BC_IN_p_gauge")));
            }
            if ctx.case.has_expression("BC_IN_Tt") && ctx.energy_enabled() {
                seeds.push(("temperature", json!("BC_IN_Tt")));
            }
            for (field, value) in seeds {
                ctx.driver
                    .try_set(&format!("{defaults}/{field}"), value, key)?;
            }
            standard_initialize(ctx, key)?;
        }
        InitRecipe::Hybrid01 => {
            standard_initialize(ctx, key)?;
            ctx.driver.set_enum(
                &format!("{INITIALIZATION}/initialization_type"),
                "hybrid",
                key,
            )?;
            ctx.driver.try_set(
                &format!("{INITIALIZATION}/hybrid_init_options/general_settings/initial_pressure"),
                Value::from(true),
                key,
            )?;
            ctx.driver.set_enum(
                &format!("{INITIALIZATION}/reference_frame"),
                "absolute",
                key,
            )?;
            ctx.driver
                .try_invoke(&format!("{INITIALIZATION}/hybrid_initialize"), Value::Null, key)?;
        }
        InitRecipe::Fmg01 | InitRecipe::Fmg02 | InitRecipe::Fmg03 => {
            if let Some(base) = recipe.fmg_base() {
                run_recipe(ctx, base)?;
            }
            if ctx.driver.supports(Feature::LegacyFmgToggle) {
                ctx.driver
                    .try_scheme("(rpsetvar 'fmg-init/enable-with-pressure-based? #t)", key)?;
            }
            ctx.driver
                .try_invoke(&format!("{INITIALIZATION}/fmg_initialize"), Value::Null, key)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_falls_back_to_standard() {
        assert_eq!(InitRecipe::select("init_fmg_01", true), InitRecipe::Standard01);
        assert_eq!(InitRecipe::select("init_hybrid_01", true), InitRecipe::Hybrid01);
        assert_eq!(InitRecipe::select("init_fmg_03", false), InitRecipe::Fmg03);
        assert_eq!(InitRecipe::select("init_magic", false), InitRecipe::Standard01);
    }

    #[test]
    fn defaults_prefer_mass_flow_inlets() {
        let zones = vec![
            ("in_p".to_string(), "pressure-inlet".to_string()),
            ("in_m".to_string(), "mass-flow-inlet".to_string()),
        ];
        assert_eq!(compute_defaults_args(&zones)["from_zone_name"], json!("in_m"));
        assert_eq!(compute_defaults_args(&zones[..1])["from_zone_name"], json!("in_p"));
        assert_eq!(compute_defaults_args(&[])["all_zones"], json!(true));
    }
}
