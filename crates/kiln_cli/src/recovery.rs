//! `kiln recovery`: review saved recoveries of failed runs.

use kiln_recovery::{RecoveryState, RecoverySummary};

use crate::pipeline::{load_project, print_json};
use crate::{GlobalArgs, RecoveryCommand, ReportFormat};

/// Runs a `kiln recovery` subcommand.
pub fn run(action: &RecoveryCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let manager = load_project(global)?.recovery();

    match action {
        RecoveryCommand::List { archived, format } => {
            let summaries = if *archived {
                manager.list_archived()
            } else {
                manager.list_pending()
            };
            match format {
                ReportFormat::Json => print_json(&summaries)?,
                ReportFormat::Text if summaries.is_empty() => {
                    if !global.quiet {
                        println!("no recoveries");
                    }
                }
                ReportFormat::Text => {
                    for summary in &summaries {
                        println!("{}", render_summary(summary));
                    }
                }
            }
        }
        RecoveryCommand::Show { id, context, format } => {
            let state = manager.find(id)?;
            match (format, context) {
                (ReportFormat::Json, _) => print_json(&state)?,
                (ReportFormat::Text, true) => print!("{}", state.healing_context()),
                (ReportFormat::Text, false) => print!("{}", render_state(&state)),
            }
        }
        RecoveryCommand::Resolve { id } => {
            let state = manager.find(id)?;
            let path = manager.mark_resolved(&state.goal_hash)?;
            if !global.quiet {
                println!("archived {} to {}", state.goal_hash, path.display());
            }
        }
        RecoveryCommand::Delete { id } => {
            let state = manager.find(id)?;
            manager.delete(&state.goal_hash)?;
            if !global.quiet {
                println!("deleted {}", state.goal_hash);
            }
        }
    }
    Ok(0)
}

fn render_summary(summary: &RecoverySummary) -> String {
    let mut counts = Vec::new();
    for (count, label) in [
        (summary.passed, "passed"),
        (summary.failed, "failed"),
        (summary.waiting, "waiting"),
        (summary.fixed, "fixed"),
        (summary.skipped, "skipped"),
    ] {
        if count > 0 {
            counts.push(format!("{count} {label}"));
        }
    }
    format!(
        "{}  {:<36} {:>9}  {}",
        summary.goal_hash,
        counts.join(", "),
        summary.age_str(),
        summary.goal_preview
    )
}

fn render_state(state: &RecoveryState) -> String {
    let mut out = format!(
        "{}\n  goal      {}\n  run       {}\n  status    {}\n",
        state.goal_hash,
        state.goal,
        state.run_id,
        state.summary()
    );
    if let Some(gate) = &state.failed_gate {
        out.push_str(&format!("  gate      {gate}\n"));
    }
    if !state.failure_reason.is_empty() {
        out.push_str(&format!("  reason    {}\n", state.failure_reason));
    }
    out.push('\n');
    for artifact in state.artifacts.values() {
        out.push_str(&format!("  {:<8} {}\n", artifact.status.as_str(), artifact.path));
        for error in &artifact.errors {
            out.push_str(&format!("           {error}\n"));
        }
    }
    out
}
