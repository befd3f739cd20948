//! `kiln cache`: inspect or clear the execution cache.

use chrono::{DateTime, Utc};
use kiln_cache::{CacheEntry, CacheStats, ExecutionCache, ExecutionStatus};
use serde::Serialize;

use crate::pipeline::{load_project, print_json};
use crate::{CacheCommand, GlobalArgs, ReportFormat};

/// A cache entry with hashes rendered as hex.
#[derive(Debug, Serialize)]
struct EntryView<'a> {
    artifact_id: &'a str,
    status: ExecutionStatus,
    input_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    spec_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    executed_at: DateTime<Utc>,
    execution_time_ms: u64,
    skip_count: u64,
}

impl<'a> From<&'a CacheEntry> for EntryView<'a> {
    fn from(entry: &'a CacheEntry) -> Self {
        Self {
            artifact_id: &entry.artifact_id,
            status: entry.status,
            input_hash: entry.input_hash.to_string(),
            spec_hash: entry.spec_hash.map(|h| h.to_string()),
            content: entry.result.as_ref().map(|r| r.content.as_str()),
            error: entry.error.as_deref(),
            executed_at: entry.executed_at,
            execution_time_ms: entry.execution_time_ms,
            skip_count: entry.skip_count,
        }
    }
}

/// Runs a `kiln cache` subcommand.
pub fn run(action: &CacheCommand, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let cache = project.open_cache()?;

    match action {
        CacheCommand::Stats { format } => {
            let stats = cache.stats();
            match format {
                ReportFormat::Json => print_json(&stats)?,
                ReportFormat::Text => print!("{}", render_stats(&stats, &cache)),
            }
        }
        CacheCommand::Show { artifact, format } => {
            let Some(entry) = cache.get(artifact) else {
                eprintln!("error: no cache entry for '{artifact}'");
                return Ok(1);
            };
            match format {
                ReportFormat::Json => print_json(&EntryView::from(&entry))?,
                ReportFormat::Text => print!("{}", render_entry(&entry)),
            }
        }
        CacheCommand::List { format } => {
            let entries = cache.list();
            match format {
                ReportFormat::Json => {
                    let views: Vec<EntryView<'_>> = entries.iter().map(EntryView::from).collect();
                    print_json(&views)?;
                }
                ReportFormat::Text => {
                    for entry in &entries {
                        println!(
                            "{:<24} {:<9} {}  {}",
                            entry.artifact_id,
                            entry.status.as_str(),
                            entry.input_hash.short(),
                            entry.executed_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
        }
        CacheCommand::Clear { artifact: Some(id) } => {
            let removed = cache.delete(id)?;
            cache.flush()?;
            if !global.quiet {
                if removed {
                    println!("removed cache entry for {id}");
                } else {
                    println!("no cache entry for {id}");
                }
            }
        }
        CacheCommand::Clear { artifact: None } => {
            let count = cache.len();
            cache.clear()?;
            cache.flush()?;
            if !global.quiet {
                println!("cleared {count} cache entries");
            }
        }
    }
    Ok(0)
}

fn render_stats(stats: &CacheStats, cache: &ExecutionCache) -> String {
    let mut out = format!("artifacts       {}\n", stats.total_artifacts);
    for (status, count) in &stats.by_status {
        out.push_str(&format!("  {:<13} {count}\n", status.as_str()));
    }
    out.push_str(&format!("skips           {}\n", stats.total_skips));
    out.push_str(&format!(
        "avg execution   {:.0}ms\n",
        stats.avg_execution_time_ms
    ));
    out.push_str(&format!(
        "time saved      ~{:.0}ms\n",
        stats.estimated_time_saved_ms
    ));
    out.push_str(&format!("hit rate        {:.1}%\n", stats.cache_hit_rate));
    if let Some(last) = cache.last_executed() {
        out.push_str(&format!(
            "last executed   {}\n",
            last.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    out
}

fn render_entry(entry: &CacheEntry) -> String {
    let mut out = format!(
        "{} ({})\n  input hash  {}\n",
        entry.artifact_id,
        entry.status.as_str(),
        entry.input_hash
    );
    if let Some(spec_hash) = entry.spec_hash {
        out.push_str(&format!("  spec hash   {spec_hash}\n"));
    }
    out.push_str(&format!(
        "  executed    {} in {}ms, reused {} time(s)\n",
        entry.executed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        entry.execution_time_ms,
        entry.skip_count
    ));
    if let Some(error) = &entry.error {
        out.push_str(&format!("  error       {error}\n"));
    }
    if let Some(result) = &entry.result {
        out.push('\n');
        out.push_str(&result.content);
        if !result.content.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_cache::ArtifactOutput;
    use kiln_common::ContentHash;

    fn completed() -> CacheEntry {
        CacheEntry::completed(
            ContentHash::from_str_content("A"),
            ArtifactOutput {
                artifact_id: "A".to_string(),
                content: "struct A;".to_string(),
                duration_ms: 12,
            },
        )
    }

    #[test]
    fn entry_view_uses_hex_hashes() {
        let entry = completed();
        let json = serde_json::to_value(EntryView::from(&entry)).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["input_hash"].as_str().unwrap().len(), 64);
        assert_eq!(json["content"], "struct A;");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn render_entry_shows_content_and_timing() {
        let text = render_entry(&completed());
        assert!(text.starts_with("A (completed)"));
        assert!(text.contains("in 12ms, reused 0 time(s)"));
        assert!(text.ends_with("struct A;\n"));
    }

    #[test]
    fn render_stats_lists_statuses() {
        let cache = ExecutionCache::temporary().unwrap();
        cache.put(completed()).unwrap();
        cache.record_skip("A").unwrap();
        let text = render_stats(&cache.stats(), &cache);
        assert!(text.starts_with("artifacts       1\n"));
        assert!(text.contains("  completed     1\n"));
        assert!(text.contains("skips           1\n"));
        assert!(text.contains("last executed"));
    }
}
