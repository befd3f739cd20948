//! `kiln plan`: dry-run the executor against the cache.

use kiln_exec::{ExecutionPlan, IncrementalExecutor};

use crate::pipeline::{force_set, load_graph, load_project, print_json, report_graph_problems};
use crate::{GlobalArgs, PlanArgs, ReportFormat};

/// Runs the `kiln plan` command. Planning never writes the cache.
pub fn run(args: &PlanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let graph = load_graph(&args.graph)?;
    report_graph_problems(&graph, global);
    let force = force_set(&graph, &args.force)?;

    let cache = project.open_cache()?;
    let plan = IncrementalExecutor::new(&graph, &cache).plan_execution(&force);

    match args.format {
        ReportFormat::Json => print_json(&plan.report())?,
        ReportFormat::Text => print!("{}", render(&plan)),
    }
    Ok(0)
}

fn render(plan: &ExecutionPlan) -> String {
    let mut out = format!(
        "{} artifacts: {} to execute, {} to skip ({:.1}% reused)\n",
        plan.total(),
        plan.to_execute.len(),
        plan.to_skip.len(),
        plan.skip_percentage()
    );
    for artifact in plan.report().artifacts {
        out.push_str(&format!(
            "  {:<7} {:<24} {}",
            artifact.action, artifact.id, artifact.reason
        ));
        if !artifact.unsatisfied.is_empty() {
            out.push_str(&format!(" (missing: {})", artifact.unsatisfied.join(", ")));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use kiln_cache::{ArtifactOutput, ExecutionCache, ExecutionStatus};
    use kiln_exec::plan_execution;
    use kiln_graph::{ArtifactGraph, ArtifactSpec};

    #[test]
    fn render_lists_actions_and_reasons() {
        let graph = ArtifactGraph::from_specs([
            ArtifactSpec::new("A", "base", ""),
            ArtifactSpec::new("B", "needs A", "").requiring("A"),
        ])
        .unwrap();
        let cache = ExecutionCache::temporary().unwrap();
        let first = plan_execution(&graph, &cache, &BTreeSet::new());
        let hash = first.computed_hashes["A"];
        cache
            .set(
                "A",
                hash,
                ExecutionStatus::Completed,
                Some(ArtifactOutput {
                    artifact_id: "A".to_string(),
                    content: "a".to_string(),
                    duration_ms: 5,
                }),
            )
            .unwrap();

        let text = render(&plan_execution(&graph, &cache, &BTreeSet::new()));
        assert!(text.starts_with("2 artifacts: 1 to execute, 1 to skip (50.0% reused)"));
        assert!(text.contains("execute B"));
        assert!(text.contains("no_cache"));
        assert!(text.contains("skip    A"));
        assert!(text.contains("unchanged_success"));
    }
}
