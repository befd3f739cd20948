//! `kiln impact`: what a change to one artifact would invalidate.

use kiln_exec::{impact_analysis, ImpactReport};

use crate::pipeline::{load_graph, print_json};
use crate::{GlobalArgs, ImpactArgs, ReportFormat};

/// Runs the `kiln impact` command.
pub fn run(args: &ImpactArgs, _global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let graph = load_graph(&args.graph)?;
    let report = impact_analysis(&graph, &args.artifact)?;

    match args.format {
        ReportFormat::Json => print_json(&report)?,
        ReportFormat::Text => print!("{}", render(&report)),
    }
    Ok(0)
}

fn render(report: &ImpactReport) -> String {
    if report.transitive_dependents.is_empty() {
        return format!("nothing depends on {}\n", report.artifact);
    }
    let mut out = format!(
        "changing {} invalidates {} artifact(s)\n",
        report.artifact,
        report.transitive_dependents.len()
    );
    for id in &report.transitive_dependents {
        let kind = if report.direct_dependents.contains(id) {
            "direct"
        } else {
            "transitive"
        };
        out.push_str(&format!("  {id:<24} {kind}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_marks_direct_dependents() {
        let report = ImpactReport {
            artifact: "A".to_string(),
            direct_dependents: vec!["B".to_string()],
            transitive_dependents: vec!["B".to_string(), "C".to_string()],
        };
        let text = render(&report);
        assert!(text.starts_with("changing A invalidates 2 artifact(s)"));
        assert!(text.contains(&format!("{:<24} direct", "B")));
        assert!(text.contains(&format!("{:<24} transitive", "C")));
    }

    #[test]
    fn render_leaf() {
        let report = ImpactReport {
            artifact: "Z".to_string(),
            direct_dependents: vec![],
            transitive_dependents: vec![],
        };
        assert_eq!(render(&report), "nothing depends on Z\n");
    }
}
