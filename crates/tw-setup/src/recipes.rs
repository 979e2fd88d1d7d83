//! Setup recipes: which steps run and with or without energy.

use crate::context::StageContext;
use crate::error::SetupResult;
use crate::interfaces::InterfaceSummary;
use crate::reports::ReportSummary;
use crate::{boundary, cell_zones, expressions, interfaces, materials, physics, reports, topology};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupRecipe {
    Compressible,
    Incompressible,
    CompressibleNoBc,
    IncompressibleNoBc,
    /// Boundary conditions on an already prepared case.
    BcOnly,
}

impl SetupRecipe {
    pub const ALL: [SetupRecipe; 5] = [
        Self::Compressible,
        Self::Incompressible,
        Self::CompressibleNoBc,
        Self::IncompressibleNoBc,
        Self::BcOnly,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Compressible => "setup_compressible_01",
            Self::Incompressible => "setup_incompressible_01",
            Self::CompressibleNoBc => "setup_compressible_nobc_01",
            Self::IncompressibleNoBc => "setup_incompressible_nobc_01",
            Self::BcOnly => "setup_bc_only_01",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    /// Energy setting the recipe imposes; `None` keeps what the solver has.
    pub fn energy(&self) -> Option<bool> {
        match self {
            Self::Compressible | Self::CompressibleNoBc => Some(true),
            Self::Incompressible | Self::IncompressibleNoBc => Some(false),
            Self::BcOnly => None,
        }
    }

    pub fn assigns_boundaries(&self) -> bool {
        !matches!(self, Self::CompressibleNoBc | Self::IncompressibleNoBc)
    }

    pub fn sets_physics(&self) -> bool {
        !matches!(self, Self::BcOnly)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetupOutcome {
    pub expression_file: Option<PathBuf>,
    pub energy: bool,
    pub interfaces: InterfaceSummary,
    pub topologies: Vec<String>,
    pub reports: ReportSummary,
}

/// Everything between mesh import and numerics, in solver order.
pub fn run_setup(ctx: &mut StageContext<'_>, recipe: SetupRecipe) -> SetupResult<SetupOutcome> {
    tracing::info!(case = ctx.case.name(), recipe = recipe.name(), "setup");
    let mut outcome = SetupOutcome {
        expression_file: Some(expressions::apply(ctx)?),
        ..Default::default()
    };

    let energy = match recipe.energy() {
        Some(energy) => energy,
        None => ctx.energy_enabled(),
    };
    outcome.energy = energy;
    if recipe.sets_physics() {
        physics::apply(ctx, energy)?;
        materials::apply(ctx, energy)?;
    }
    cell_zones::apply(ctx)?;
    if recipe.assigns_boundaries() {
        boundary::apply(ctx, energy)?;
    }

    outcome.interfaces = interfaces::apply(ctx)?;
    outcome.topologies = topology::apply(ctx, &outcome.interfaces)?;

    outcome.reports = reports::apply(ctx, energy)?;
    reports::residuals(ctx)?;
    reports::cov_reports(ctx, &mut outcome.reports)?;
    reports::convergence_condition(ctx)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_flags() {
        assert_eq!(SetupRecipe::from_name("setup_bc_only_01"), Some(SetupRecipe::BcOnly));
        assert!(!SetupRecipe::BcOnly.sets_physics());
        assert_eq!(SetupRecipe::BcOnly.energy(), None);
        assert!(!SetupRecipe::IncompressibleNoBc.assigns_boundaries());
        assert_eq!(SetupRecipe::Incompressible.energy(), Some(false));
        assert_eq!(SetupRecipe::from_name("setup_02"), None);
    }
}
