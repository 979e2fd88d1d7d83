//! Energy, gravity, turbulence and mixing-plane knobs.

use crate::context::StageContext;
use crate::error::SetupResult;
use serde_json::{Value, json};

pub const K_OMEGA_VARIANTS: [&str; 5] = ["sst", "geko", "bsl", "standard", "wj-bsl-std"];

const VISCOUS: &str = "setup/models/viscous";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurbulenceModel {
    KOmega(String),
    TransitionSst,
    TransitionGamma,
    TransitionAlgebraic,
}

impl TurbulenceModel {
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_lowercase();
        match name.as_str() {
            "transition-sst" => Some(Self::TransitionSst),
            "transition-gamma" => Some(Self::TransitionGamma),
            "transition-algebraic" => Some(Self::TransitionAlgebraic),
            v if K_OMEGA_VARIANTS.contains(&v) => Some(Self::KOmega(v.to_string())),
            _ => None,
        }
    }

    pub fn is_geko(&self) -> bool {
        matches!(self, Self::KOmega(v) if v == "geko")
    }
}

pub fn apply(ctx: &mut StageContext<'_>, energy: bool) -> SetupResult<()> {
    ctx.driver
        .try_set("setup/models/energy/enabled", Value::from(energy), "setup")?;
    ctx.driver.try_set(
        "setup/models/energy/viscous_dissipation",
        Value::from(energy),
        "setup",
    )?;

    if ctx.case.has("setup", "gravity") {
        match ctx.case.f64_list_in("setup", "gravity") {
            Some(g) if g.len() == 3 => {
                let base = "setup/general/operating_conditions/gravity";
                if ctx
                    .driver
                    .try_set(&format!("{base}/enable"), Value::from(true), "setup.gravity")?
                {
                    ctx.driver
                        .try_set(&format!("{base}/components"), json!(g), "setup.gravity")?;
                }
            }
            _ => tracing::warn!(key = "setup.gravity", "gravity needs three components, ignored"),
        }
    }

    let requested = ctx.case.text_or("setup", "turbulence_model", "sst");
    let model = TurbulenceModel::parse(&requested).unwrap_or_else(|| {
        tracing::warn!(key = "setup.turbulence_model", "unsupported turbulence model '{requested}', using sst");
        TurbulenceModel::KOmega("sst".to_string())
    });
    apply_turbulence(ctx, &model)?;

    if model.is_geko() {
        for (cfg, param) in [("geko_csep", "csep"), ("geko_cnw", "cnw"), ("geko_cjet", "cjet")] {
            if let Some(v) = ctx.case.f64_in("setup", cfg) {
                ctx.driver.try_set(
                    &format!("{VISCOUS}/geko_options/{param}"),
                    Value::from(v),
                    &format!("setup.{cfg}"),
                )?;
            }
        }
    }

    if let Some(method) = ctx.case.f64_in("setup", "mp_copy_method") {
        let expr = format!("(rpsetvar 'mp/copy-method {})", method.round() as i64);
        ctx.driver.try_scheme(&expr, "setup.mp_copy_method")?;
    }
    Ok(())
}

fn apply_turbulence(ctx: &mut StageContext<'_>, model: &TurbulenceModel) -> SetupResult<()> {
    let key = "setup.turbulence_model";
    let model_path = format!("{VISCOUS}/model");
    let variant_path = format!("{VISCOUS}/k_omega_model");
    let transition_path = format!("{VISCOUS}/transition_module");
    match model {
        TurbulenceModel::KOmega(variant) => {
            ctx.driver.set_enum(&model_path, "k-omega", key)?;
            if !ctx.driver.set_enum(&variant_path, variant, key)? {
                tracing::warn!(key, "k-omega variant '{variant}' rejected, using sst");
                ctx.driver.set_enum(&variant_path, "sst", key)?;
            }
        }
        TurbulenceModel::TransitionSst => {
            ctx.driver.set_enum(&model_path, "transition-sst", key)?;
        }
        TurbulenceModel::TransitionGamma | TurbulenceModel::TransitionAlgebraic => {
            let module = if *model == TurbulenceModel::TransitionGamma {
                "gamma-transport-eqn"
            } else {
                "gamma-algebraic"
            };
            ctx.driver.set_enum(&model_path, "k-omega", key)?;
            ctx.driver.set_enum(&variant_path, "sst", key)?;
            ctx.driver.set_enum(&transition_path, module, key)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_names() {
        assert_eq!(TurbulenceModel::parse("SST"), Some(TurbulenceModel::KOmega("sst".into())));
        assert!(TurbulenceModel::parse("geko").unwrap().is_geko());
        assert_eq!(TurbulenceModel::parse("transition-gamma"), Some(TurbulenceModel::TransitionGamma));
        assert_eq!(TurbulenceModel::parse("k-epsilon"), None);
    }
}
