//! The solve stage.

use crate::SolveResult;
use serde_json::json;
use tw_setup::StageContext;
use tw_setup::reports::DEFAULT_ITER_COUNT;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SolveOutcome {
    pub ran: bool,
    pub iterations: usize,
}

/// Write case and data as `<caseFilename><suffix>` into the case folder.
pub fn write_case_data(ctx: &mut StageContext<'_>, suffix: &str) -> SolveResult<bool> {
    let file_name = ctx
        .layout
        .solver_file(&format!("{}{suffix}", ctx.case.filename()));
    Ok(ctx
        .driver
        .try_invoke(
            "file/write_case_data",
            json!({"file_name": file_name}),
            "caseFilename",
        )?
        .is_some())
}

/// Iterate and write `<caseFilename>_fin`. The solver's convergence
/// conditions stop the run early.
pub fn run_solver(ctx: &mut StageContext<'_>) -> SolveResult<SolveOutcome> {
    if !ctx.case.bool_or("solution", "runSolver", true) {
        tracing::info!(case = ctx.case.name(), "solver run disabled");
        return Ok(SolveOutcome::default());
    }
    let iterations = ctx
        .case
        .usize_or("solution", "iter_count", DEFAULT_ITER_COUNT);
    tracing::info!(case = ctx.case.name(), iterations, "solving");
    let done = ctx.driver.try_invoke(
        "solution/run_calculation/iterate",
        json!({"iter_count": iterations}),
        "solution.iter_count",
    )?;
    let Some(done) = done else {
        return Ok(SolveOutcome::default());
    };
    write_case_data(ctx, "_fin")?;
    Ok(SolveOutcome {
        ran: true,
        iterations: done.as_u64().map(|n| n as usize).unwrap_or(iterations),
    })
}
