//! `kiln run`: execute a graph through an external creation command.
//!
//! 1. Load the project configuration and the graph
//! 2. Plan against the cache and execute what is stale
//! 3. Record the goal's artifacts in the cache
//! 4. On failure, save a recovery for later review

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use kiln_cache::{CacheError, ExecutionCache};
use kiln_dedupe::{Retention, WorkDeduper};
use kiln_exec::{CreationError, ExecutionResult, ExecutorOptions, IncrementalExecutor};
use kiln_graph::{ArtifactGraph, ArtifactSpec};
use kiln_recovery::{ExecutedArtifact, FailedRun, GateResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::pipeline::{force_set, load_graph, load_project, print_json, report_graph_problems};
use crate::{GlobalArgs, ReportFormat, RunArgs};

/// Gate name recorded on recoveries of failed creation calls.
const CREATION_GATE: &str = "creation";

/// Creates artifacts by running a shell command once per artifact.
#[derive(Debug)]
struct ShellCommand<'a> {
    command: &'a str,
    workdir: &'a Path,
}

impl ShellCommand<'_> {
    fn create(&self, spec: &ArtifactSpec) -> Result<String, CreationError> {
        let input = serde_json::to_vec(spec).map_err(|e| CreationError::new(e.to_string()))?;
        debug!(artifact = %spec.id, command = self.command, "spawning creation command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(self.command)
            .current_dir(self.workdir)
            .env("KILN_ARTIFACT_ID", &spec.id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| CreationError::new(format!("failed to spawn `{}`: {e}", self.command)))?;

        // Fed from its own thread so a command that writes before reading
        // cannot fill both pipes.
        let feeder = child
            .stdin
            .take()
            .map(|mut stdin| std::thread::spawn(move || stdin.write_all(&input)));
        let output = child
            .wait_with_output()
            .map_err(|e| CreationError::new(format!("failed to wait for `{}`: {e}", self.command)))?;
        match feeder.map(|handle| handle.join()) {
            Some(Ok(Err(e))) => {
                debug!(artifact = %spec.id, error = %e, "command did not read its input")
            }
            Some(Err(_)) => debug!(artifact = %spec.id, "stdin writer panicked"),
            _ => {}
        }

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(CreationError::new(if stderr.is_empty() {
            format!("command exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

/// Machine-readable outcome of `kiln run`.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    run_id: &'a str,
    duration_ms: u64,
    complete: bool,
    completed: Vec<&'a str>,
    skipped: Vec<&'a str>,
    failed: &'a BTreeMap<String, String>,
    blocked: &'a BTreeMap<String, Vec<String>>,
    storage_errors: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    recovery: Option<SavedRecovery>,
}

#[derive(Debug, Serialize)]
struct SavedRecovery {
    goal_hash: String,
    path: PathBuf,
}

/// Runs the `kiln run` command.
///
/// Returns exit code 0 if every artifact completed or was reused and every
/// cache write went through, 1 otherwise. A failed bookkeeping write is
/// reported alongside the run and never prevents saving the recovery.
pub fn run(args: &RunArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let project = load_project(global)?;
    let graph = load_graph(&args.graph)?;
    report_graph_problems(&graph, global);
    let force = force_set(&graph, &args.force)?;
    let cache = project.open_cache()?;

    let retention = if project.config.dedupe.retain_results {
        Retention::Memoize
    } else {
        Retention::InFlight
    };
    let deduper = WorkDeduper::with_retention(retention);
    let mut executor = IncrementalExecutor::new(&graph, &cache).with_options(ExecutorOptions {
        parallel: project.config.executor.parallel,
    });
    if project.config.executor.dedupe {
        executor = executor.with_deduper(&deduper);
    }

    let command = ShellCommand {
        command: &args.exec,
        workdir: &project.paths.root,
    };
    let mut result = executor.execute(&force, |spec| command.create(spec));

    let goal = args.goal.clone().unwrap_or_else(|| default_goal(&args.graph));
    record_goal(&cache, &graph, &goal, &mut result);

    let recovery = if result.is_complete() {
        None
    } else {
        let manager = project.recovery();
        let state = manager.create_from_execution(failed_run(&graph, &result, &goal));
        let path = manager.save(&state)?;
        info!(goal_hash = %state.goal_hash, "saved recovery for failed run");
        Some(SavedRecovery {
            goal_hash: state.goal_hash,
            path,
        })
    };

    match args.format {
        ReportFormat::Json => print_json(&RunReport {
            run_id: &result.run_id,
            duration_ms: result.duration_ms,
            complete: result.is_complete(),
            completed: result.completed.keys().map(String::as_str).collect(),
            skipped: result.skipped.keys().map(String::as_str).collect(),
            failed: &result.failed,
            blocked: &result.blocked,
            storage_errors: &result.storage_errors,
            recovery,
        })?,
        ReportFormat::Text if !global.quiet => {
            print!("{}", render(&result, global.verbose));
            if let Some(saved) = &recovery {
                println!(
                    "recovery saved as {} ({})",
                    saved.goal_hash,
                    saved.path.display()
                );
            }
        }
        ReportFormat::Text => {}
    }

    Ok(exit_code(&result))
}

fn exit_code(result: &ExecutionResult) -> i32 {
    if result.is_complete() && result.storage_errors.is_empty() {
        0
    } else {
        1
    }
}

/// Records the goal's artifacts and flushes the cache.
fn record_goal(
    cache: &ExecutionCache,
    graph: &ArtifactGraph,
    goal: &str,
    result: &mut ExecutionResult,
) {
    let goal_hash = kiln_common::goal_hash(goal);
    let recorded = cache.record_goal(
        &goal_hash,
        graph.ids().map(str::to_string),
        Some(result.duration_ms),
    );
    note_storage_failure(result, "recording goal", recorded);
    let flushed = cache.flush();
    note_storage_failure(result, "flushing cache", flushed);
}

fn note_storage_failure(
    result: &mut ExecutionResult,
    action: &str,
    outcome: Result<(), CacheError>,
) {
    if let Err(e) = outcome {
        warn!(error = %e, "{action} failed");
        result.storage_errors.push(format!("{action}: {e}"));
    }
}

fn default_goal(graph_path: &Path) -> String {
    std::fs::canonicalize(graph_path)
        .unwrap_or_else(|_| graph_path.to_path_buf())
        .display()
        .to_string()
}

/// Describes a run's outcome in the shape recovery expects.
///
/// Completed and reused artifacts pass their gate, failed ones fail with their
/// error. Blocked artifacts carry no gate result; they end up waiting behind
/// the failure that held them back, or failed if they require an artifact the
/// graph does not define.
fn failed_run(graph: &ArtifactGraph, result: &ExecutionResult, goal: &str) -> FailedRun {
    let mut run = FailedRun::new(goal, result.run_id.clone());
    run.failed_gate = Some(CREATION_GATE.to_string());
    run.failure_reason = format!(
        "{} artifact(s) failed, {} blocked",
        result.failed.len(),
        result.blocked.len()
    );

    for id in graph.topological_order() {
        let Some(spec) = graph.get(id) else { continue };
        let gate = if let Some(error) = result.failed.get(id) {
            Some(GateResult::fail([error.clone()]))
        } else if result.blocked.contains_key(id) {
            let missing = graph.unresolved(id);
            (!missing.is_empty()).then(|| {
                GateResult::fail(missing.iter().map(|m| format!("missing dependency: {m}")))
            })
        } else {
            Some(GateResult::pass())
        };
        if let Some(gate) = gate {
            run.gate_results.insert(id.to_string(), gate);
        }

        let mut artifact = ExecutedArtifact::new(id, result.content(id).unwrap_or_default());
        artifact.depends_on = spec.requires.iter().cloned().collect();
        run.artifacts.push(artifact);
    }
    run
}

fn render(result: &ExecutionResult, verbose: bool) -> String {
    let mut out = format!("{}\n", result.summary());
    if verbose {
        for id in result.completed.keys() {
            out.push_str(&format!("  created  {id}\n"));
        }
        for id in result.skipped.keys() {
            out.push_str(&format!("  reused   {id}\n"));
        }
    }
    for (id, error) in &result.failed {
        out.push_str(&format!("  failed   {id}: {error}\n"));
    }
    for (id, waiting_on) in &result.blocked {
        out.push_str(&format!("  blocked  {id} (waiting on {})\n", waiting_on.join(", ")));
    }
    for error in &result.storage_errors {
        out.push_str(&format!("  storage  {error}\n"));
    }
    out
}
