use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::Level;
use tw_app::{AppResult, OfflineLauncher, RunProgressEvent, RunSummary, run_wizard_with_progress};
use tw_results::CaseStatus;

#[derive(Parser)]
#[command(name = "tw-cli")]
#[command(about = "TurboWizard - turbomachinery CFD setup, solve and post-processing", long_about = None)]
struct Cli {
    /// Path to the JSON or YAML configuration file
    #[arg(default_value = "turboSetupConfig.json")]
    config: PathBuf,
    /// Do not print stage progress
    #[arg(long)]
    quiet: bool,
}

/// `debug_level` of the configuration: 0 warnings only, 1 info, 2 debug,
/// anything above traces.
fn log_level(config: &Path) -> Level {
    let debug_level = tw_config::load_config(config)
        .map(|c| c.debug_level())
        .unwrap_or(1);
    match debug_level {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

fn main() -> AppResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(log_level(&cli.config))
        .with_writer(std::io::stderr)
        .init();

    println!("Running wizard for: {}", cli.config.display());
    let mut launcher = OfflineLauncher::new();
    let summary = if cli.quiet {
        run_wizard_with_progress(&cli.config, &mut launcher, None)?
    } else {
        run_wizard_with_progress(
            &cli.config,
            &mut launcher,
            Some(&mut |event| render_cli_progress(&event)),
        )?
    };
    print_summary(&summary);
    Ok(())
}

fn render_cli_progress(event: &RunProgressEvent) {
    let mut line = format!("[{:>8.2}s] ", event.elapsed_wall_s);
    if let Some(target) = &event.target {
        line.push_str(&format!("{target}: "));
    }
    line.push_str(event.stage.label());
    if let Some(message) = &event.message {
        line.push_str(&format!("  ({message})"));
    }
    println!("{line}");
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!(
        "✓ Run finished: {} completed, {} skipped, {} failed",
        summary.count(CaseStatus::Completed),
        summary.count(CaseStatus::Skipped),
        summary.count(CaseStatus::Failed)
    );
    for case in &summary.cases {
        let status = match case.status {
            CaseStatus::Completed => "completed",
            CaseStatus::Skipped => "skipped",
            CaseStatus::Failed => "FAILED",
        };
        print!("  case {:<24} {:<10} iterations={}", case.name, status, case.iterations);
        if let Some(message) = &case.message {
            print!("  {message}");
        }
        println!();
    }
    for study in &summary.studies {
        let status = match (&study.outcome, &study.post) {
            (Some(outcome), _) => format!("{} design points", outcome.design_points.len()),
            (None, Some(_)) => "post-processed".to_string(),
            (None, None) => "not run".to_string(),
        };
        println!("  study {:<23} {status}", study.name);
    }
    if let Some(merged) = &summary.merged_table {
        println!("  Merged report table: {}", merged.display());
    }
    println!("  Debug dump: {}", summary.debug_dump.display());
    if !summary.unused_keys.is_empty() {
        println!("  Unused configuration keys: {}", summary.unused_keys.len());
    }
    if summary.removed_scratch_files > 0 {
        println!("  Removed {} solver scratch files", summary.removed_scratch_files);
    }
}
