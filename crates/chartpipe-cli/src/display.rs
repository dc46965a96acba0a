//! Console output for a run
//!
//! Logs carry the details; stdout gets one line per pipeline as it starts
//! and a summary at the end.

use chartpipe_pipeline::{PipelineResult, PipelineSpec, PipelineState, RunSummary};
use console::style;
use std::path::Path;

pub fn pipeline_started(spec: &PipelineSpec) {
    println!("{} {}", style("==>").cyan().bold(), style(&spec.name).bold());
}

fn result_line(result: &PipelineResult, output_dir: &Path) -> String {
    match &result.state {
        PipelineState::Written => format!(
            "  {} {} -> {}",
            style("✓").green(),
            result.name,
            output_dir.join(&result.output).display()
        ),
        PipelineState::Failed { stage, detail } => format!(
            "  {} {} ({} failed): {}",
            style("✗").red(),
            result.name,
            stage,
            detail
        ),
        // Only reachable if a run was cut short
        other => format!("  {} {} ({:?})", style("?").yellow(), result.name, other),
    }
}

pub fn print_summary(summary: &RunSummary, output_dir: &Path) {
    println!();
    println!("{}", style("Summary").bold());
    for result in &summary.results {
        println!("{}", result_line(result, output_dir));
    }

    let total = summary.results.len();
    let succeeded = summary.succeeded_count();
    let counts = format!("{} of {} pipeline(s) succeeded", succeeded, total);
    if succeeded == total {
        println!("{}", style(counts).green().bold());
    } else {
        println!("{}", style(counts).yellow().bold());
    }
}
