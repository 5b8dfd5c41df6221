// src/executor.rs: topological scheduler over the validated task graph
//
// Walks the DAG in dependency order, running independent tasks
// concurrently up to the global core ceiling. A task runs only when its
// output is missing or older than an input; finished outputs are renamed
// into place so a partial write never looks complete.

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::process::Command as TokioCommand;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::defs::{PipelineError, RunConfig};
use crate::pipelines::graph::{CommandSpec, Task, TaskAction, TaskGraph};
use crate::utils::fasta::filter_scaffolds;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExecSummary {
    pub executed: usize,
    pub skipped: usize,
}

/// True when the declared output exists and is at least as new as every
/// declared input. A missing input makes the task stale; the failure then
/// surfaces from the tool itself.
fn up_to_date(task: &Task) -> bool {
    let Ok(out_mtime) = fs::metadata(&task.output).and_then(|m| m.modified()) else {
        return false;
    };
    task.inputs.iter().all(|input| {
        match fs::metadata(input).and_then(|m| m.modified()) {
            Ok(in_mtime) => in_mtime <= out_mtime,
            Err(_) => false,
        }
    })
}

fn prepare_dirs(task: &Task) -> Result<(), PipelineError> {
    if let Some(parent) = task.output.parent() {
        fs::create_dir_all(parent)?;
    }
    if let TaskAction::Command { publish, .. } = &task.action {
        for (scratch, _) in publish {
            if let Some(parent) = scratch.parent() {
                // Stale scratch from an interrupted run must not leak into
                // this one.
                if parent.exists() {
                    fs::remove_dir_all(parent)?;
                }
                fs::create_dir_all(parent)?;
            }
        }
    }
    Ok(())
}

async fn run_command(
    task_id: &str,
    spec: &CommandSpec,
    stage: &[(PathBuf, PathBuf)],
    publish: &[(PathBuf, PathBuf)],
    verbose: bool,
) -> Result<(), PipelineError> {
    for (source, dest) in stage {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, dest).map_err(|e| PipelineError::ToolExecution {
            tool: spec.program.clone(),
            error: format!(
                "cannot stage {} as {}: {}",
                source.display(),
                dest.display(),
                e
            ),
        })?;
    }

    debug!("[{}] {}", task_id, spec.display());
    let output = TokioCommand::new(&spec.program)
        .args(&spec.args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| PipelineError::ToolExecution {
            tool: spec.program.clone(),
            error: format!("failed to spawn: {}. Is {} installed?", e, spec.program),
        })?;

    if verbose && !output.stderr.is_empty() {
        debug!("[{}] stderr: {}", task_id, String::from_utf8_lossy(&output.stderr));
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(PipelineError::ToolExecution {
            tool: spec.program.clone(),
            error: format!("exit {:?}: {}", output.status.code(), tail.join(" | ")),
        });
    }

    for (scratch, dest) in publish {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(scratch, dest).map_err(|e| PipelineError::ToolExecution {
            tool: spec.program.clone(),
            error: format!(
                "expected output {} missing or unmovable: {}",
                scratch.display(),
                e
            ),
        })?;
    }
    Ok(())
}

/// Runs one stale task to completion.
async fn run_task(task: Task, verbose: bool) -> Result<(), PipelineError> {
    prepare_dirs(&task)?;
    match &task.action {
        TaskAction::Command { spec, stage, publish } => {
            run_command(&task.id(), spec, stage, publish, verbose).await
        }
        TaskAction::FilterScaffolds { min_len } => {
            let input = task.inputs[0].clone();
            let output = task.output.clone();
            let min_len = *min_len;
            tokio::task::spawn_blocking(move || {
                filter_scaffolds(&input, &output, min_len).map(|_| ())
            })
            .await
            .map_err(|e| PipelineError::ToolExecution {
                tool: "filter".to_string(),
                error: format!("filter task panicked: {}", e),
            })?
        }
    }
}

/// Executes the graph. First failure stops new scheduling; in-flight
/// independent tasks drain before the error is returned.
pub async fn run_graph(config: Arc<RunConfig>, graph: &TaskGraph) -> Result<ExecSummary, PipelineError> {
    let dependents = graph.dependents();
    let mut indegrees = graph.indegrees();
    let mut ready: VecDeque<usize> = indegrees
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d == 0)
        .map(|(i, _)| i)
        .collect();

    let semaphore = Arc::new(Semaphore::new(config.max_cores));
    let mut in_flight: JoinSet<(usize, Result<bool, PipelineError>)> = JoinSet::new();
    let mut summary = ExecSummary::default();
    let mut failure: Option<PipelineError> = None;
    let verbose = config.args.verbose;

    loop {
        while failure.is_none() {
            let Some(index) = ready.pop_front() else {
                break;
            };
            let task = graph.tasks()[index].clone();
            let semaphore = semaphore.clone();
            let permits = (task.threads.min(config.max_cores as u64)).max(1) as u32;
            in_flight.spawn(async move {
                let _permit = match semaphore.acquire_many_owned(permits).await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(PipelineError::ToolExecution {
                                tool: task.id(),
                                error: "scheduler shut down".to_string(),
                            }),
                        );
                    }
                };
                if up_to_date(&task) {
                    debug!("[{}] up to date, skipping", task.id());
                    return (index, Ok(false));
                }
                info!("[{}] running", task.id());
                let result = run_task(task, verbose).await;
                (index, result.map(|_| true))
            });
        }

        let Some(joined) = in_flight.join_next().await else {
            break;
        };
        let (index, result) = joined.map_err(|e| PipelineError::ToolExecution {
            tool: "executor".to_string(),
            error: format!("task join failed: {}", e),
        })?;
        let task_id = graph.tasks()[index].id();

        match result {
            Ok(executed) => {
                if executed {
                    info!("[{}] done", task_id);
                    summary.executed += 1;
                } else {
                    summary.skipped += 1;
                }
                for &dependent in &dependents[index] {
                    indegrees[dependent] -= 1;
                    if indegrees[dependent] == 0 {
                        ready.push_back(dependent);
                    }
                }
            }
            Err(e) => {
                error!("[{}] failed: {}", task_id, e);
                if failure.is_none() {
                    warn!("Halting new task scheduling; letting in-flight tasks finish");
                    failure = Some(e);
                }
            }
        }
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}
