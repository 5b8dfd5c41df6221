// src/pipelines/assembly_qc.rs: rule templates for the assembly + QC run
//
// One function per rule template. Each takes the sample sheet and merged
// settings and returns concrete Task records; expand() stitches them into
// the validated TaskGraph. Expansion is pure and synchronous: same sheet
// and settings, same task set.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use log::warn;

use crate::cli::RunMode;
use crate::config::defs::{
    ASSEMBLY_STAGE, CHECKM_REPORT, CHECKM_TAG, COMBINED_REPORT_STAGE, COMPLETENESS_STAGE,
    DEFAULT_GENUS, FASTQC_TAG, FILTER_STAGE, MULTIQC_REPORT, MULTIQC_TAG, PipelineError,
    QUAST_REPORT, QUAST_TAG, READ_REPORT_STAGE, RunConfig, SAMPLE_REPORT_STAGE, SCAFFOLDS_FASTA,
    SPADES_TAG, SUMMARY_STAGE, TRIM_STAGE, TRIMMOMATIC_TAG,
};
use crate::config::settings::Settings;
use crate::manifest::{ReadRole, Sample, SampleSheet};
use crate::pipelines::graph::{CommandSpec, Task, TaskAction, TaskGraph};
use crate::utils::command::tool_options;
use crate::utils::file::{scratch_dir, stage_dir, task_dir};

pub const TRIM_RULE: &str = "trim";
pub const READ_REPORT_RULE: &str = "read-report";
pub const ASSEMBLE_RULE: &str = "assemble";
pub const FILTER_RULE: &str = "filter";
pub const SAMPLE_REPORT_RULE: &str = "per-sample-report";
pub const COMBINED_REPORT_RULE: &str = "combined-report";
pub const COMPLETENESS_RULE: &str = "completeness-report";
pub const SUMMARY_RULE: &str = "final-summary-report";

const ALL_RULES: &[&str] = &[
    TRIM_RULE,
    READ_REPORT_RULE,
    ASSEMBLE_RULE,
    FILTER_RULE,
    SAMPLE_REPORT_RULE,
    COMBINED_REPORT_RULE,
    COMPLETENESS_RULE,
    SUMMARY_RULE,
];

/// Thread count and memory ceiling for one rule, by name. A missing key
/// aborts expansion naming the key.
fn rule_resources(settings: &Settings, rule: &str) -> Result<(u64, u64), PipelineError> {
    let threads = settings.require_u64(&format!("rules.{}.threads", rule))?;
    let mem_mb = settings.require_u64(&format!("rules.{}.mem_mb", rule))?;
    Ok((threads, mem_mb))
}

/// Cluster submit prefix, or None in local mode.
fn submit_prefix(config: &RunConfig) -> Result<Option<Vec<String>>, PipelineError> {
    match config.args.mode {
        RunMode::Local => Ok(None),
        RunMode::Cluster => {
            let mut prefix: Vec<String> = config
                .settings
                .require_str("cluster.submit")?
                .split_whitespace()
                .map(str::to_string)
                .collect();
            if let Some(queue) = &config.args.queue {
                prefix.push("-p".to_string());
                prefix.push(queue.clone());
            }
            Ok(Some(prefix))
        }
    }
}

fn wrap_for_mode(
    spec: CommandSpec,
    prefix: &Option<Vec<String>>,
    threads: u64,
    mem_mb: u64,
) -> CommandSpec {
    match prefix {
        None => spec,
        Some(prefix) => {
            let mut full = prefix.clone();
            full.push("-c".to_string());
            full.push(threads.to_string());
            full.push("--mem".to_string());
            full.push(format!("{}M", mem_mb));
            spec.wrap(&full)
        }
    }
}

fn trimmed_name(sample: &str, role: ReadRole) -> String {
    format!("{}_{}.fastq.gz", sample, role.tag())
}

/// Trim output path for (sample, role); referenced both by the trim rule
/// itself and by downstream consumers.
fn trim_output(out_root: &Path, sample: &str, role: ReadRole) -> PathBuf {
    task_dir(out_root, TRIM_STAGE, sample, Some(role)).join(trimmed_name(sample, role))
}

fn assembly_output(out_root: &Path, sample: &str) -> PathBuf {
    task_dir(out_root, ASSEMBLY_STAGE, sample, None).join(SCAFFOLDS_FASTA)
}

fn filtered_output(out_root: &Path, sample: &str) -> PathBuf {
    task_dir(out_root, FILTER_STAGE, sample, None).join(SCAFFOLDS_FASTA)
}

/// Quality trimming, parameterized over the four trimmed read roles:
/// four independent tasks per sample, one published output each.
/// Every task runs trimmomatic over the raw pair into its own scratch
/// dir and publishes only its role's file, so distinct tasks never touch
/// the same output path.
fn trim_tasks(
    config: &RunConfig,
    sample: &Sample,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Vec<Task>, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let r1 = sample.require_read(ReadRole::R1, TRIM_RULE)?.clone();
    let r2 = sample.require_read(ReadRole::R2, TRIM_RULE)?.clone();
    let options = tool_options(&config.settings, "trimmomatic")?;

    let mut tasks = Vec::with_capacity(ReadRole::TRIMMED.len());
    for role in ReadRole::TRIMMED {
        let scratch = scratch_dir(out_root, &format!("{}_{}_{}", TRIM_RULE, sample.name, role.tag()));
        // Trimmomatic PE argument order: pR1 uR1 pR2 uR2.
        let quartet = [ReadRole::PR1, ReadRole::UR1, ReadRole::PR2, ReadRole::UR2]
            .map(|r| scratch.join(trimmed_name(&sample.name, r)));
        let output = trim_output(out_root, &sample.name, role);

        let spec = CommandSpec::new(TRIMMOMATIC_TAG)
            .arg("PE")
            .arg("-threads")
            .arg(threads.to_string())
            .arg("-phred33")
            .arg(r1.to_string_lossy())
            .arg(r2.to_string_lossy())
            .args(quartet.iter().map(|p| p.to_string_lossy().into_owned()))
            .args(options.clone());

        tasks.push(Task {
            rule: TRIM_RULE,
            sample: Some(sample.name.clone()),
            read_role: Some(role),
            output: output.clone(),
            inputs: vec![r1.clone(), r2.clone()],
            threads,
            mem_mb,
            action: TaskAction::Command {
                spec: wrap_for_mode(spec, prefix, threads, mem_mb),
                stage: vec![],
                publish: vec![(scratch.join(trimmed_name(&sample.name, role)), output)],
            },
        });
    }
    Ok(tasks)
}

/// Per-read quality report (fastQC), parameterized over the trimmed roles.
fn read_report_tasks(
    config: &RunConfig,
    sample: &Sample,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Vec<Task>, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "fastqc")?;

    let mut tasks = Vec::with_capacity(ReadRole::TRIMMED.len());
    for role in ReadRole::TRIMMED {
        let input = trim_output(out_root, &sample.name, role);
        let zip_name = format!("{}_{}_fastqc.zip", sample.name, role.tag());
        let scratch = scratch_dir(
            out_root,
            &format!("{}_{}_{}", READ_REPORT_RULE, sample.name, role.tag()),
        );
        let output = task_dir(out_root, READ_REPORT_STAGE, &sample.name, Some(role)).join(&zip_name);

        let spec = CommandSpec::new(FASTQC_TAG)
            .arg("--threads")
            .arg(threads.to_string())
            .arg("-o")
            .arg(scratch.to_string_lossy())
            .args(options.clone())
            .arg(input.to_string_lossy());

        tasks.push(Task {
            rule: READ_REPORT_RULE,
            sample: Some(sample.name.clone()),
            read_role: Some(role),
            output: output.clone(),
            inputs: vec![input],
            threads,
            mem_mb,
            action: TaskAction::Command {
                spec: wrap_for_mode(spec, prefix, threads, mem_mb),
                stage: vec![],
                publish: vec![(scratch.join(&zip_name), output)],
            },
        });
    }
    Ok(tasks)
}

/// De novo assembly (SPAdes) over the trimmed pair: one task per sample.
fn assemble_task(
    config: &RunConfig,
    sample: &Sample,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Task, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "spades")?;

    let p_r1 = trim_output(out_root, &sample.name, ReadRole::PR1);
    let p_r2 = trim_output(out_root, &sample.name, ReadRole::PR2);
    let scratch = scratch_dir(out_root, &format!("{}_{}", ASSEMBLE_RULE, sample.name));
    let output = assembly_output(out_root, &sample.name);

    let spec = CommandSpec::new(SPADES_TAG)
        .arg("-1")
        .arg(p_r1.to_string_lossy())
        .arg("-2")
        .arg(p_r2.to_string_lossy())
        .arg("-t")
        .arg(threads.to_string())
        .arg("-m")
        .arg((mem_mb / 1024).max(1).to_string())
        .args(options)
        .arg("-o")
        .arg(scratch.to_string_lossy());

    Ok(Task {
        rule: ASSEMBLE_RULE,
        sample: Some(sample.name.clone()),
        read_role: None,
        output: output.clone(),
        inputs: vec![p_r1, p_r2],
        threads,
        mem_mb,
        action: TaskAction::Command {
            spec: wrap_for_mode(spec, prefix, threads, mem_mb),
            stage: vec![],
            publish: vec![(scratch.join(SCAFFOLDS_FASTA), output)],
        },
    })
}

/// Built-in scaffold length filter: one task per sample. Records of
/// length >= filter.min_scaffold_length are retained (boundary included).
fn filter_task(
    config: &RunConfig,
    sample: &Sample,
    resources: (u64, u64),
    min_len: u64,
) -> Task {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    Task {
        rule: FILTER_RULE,
        sample: Some(sample.name.clone()),
        read_role: None,
        output: filtered_output(out_root, &sample.name),
        inputs: vec![assembly_output(out_root, &sample.name)],
        threads,
        mem_mb,
        action: TaskAction::FilterScaffolds { min_len },
    }
}

/// Per-sample assembly report (QUAST).
fn sample_report_task(
    config: &RunConfig,
    sample: &Sample,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Task, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "quast")?;

    let input = filtered_output(out_root, &sample.name);
    let scratch = scratch_dir(out_root, &format!("{}_{}", SAMPLE_REPORT_RULE, sample.name));
    let output = task_dir(out_root, SAMPLE_REPORT_STAGE, &sample.name, None).join(QUAST_REPORT);

    let spec = CommandSpec::new(QUAST_TAG)
        .arg("-t")
        .arg(threads.to_string())
        .arg("-o")
        .arg(scratch.to_string_lossy())
        .args(options)
        .arg(input.to_string_lossy());

    Ok(Task {
        rule: SAMPLE_REPORT_RULE,
        sample: Some(sample.name.clone()),
        read_role: None,
        output: output.clone(),
        inputs: vec![input],
        threads,
        mem_mb,
        action: TaskAction::Command {
            spec: wrap_for_mode(spec, prefix, threads, mem_mb),
            stage: vec![],
            publish: vec![(scratch.join(QUAST_REPORT), output)],
        },
    })
}

/// Combined assembly report (QUAST): exactly one task per run, fanning in
/// over every sample's filtered scaffolds.
fn combined_report_task(
    config: &RunConfig,
    sheet: &SampleSheet,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Task, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "quast")?;

    let inputs: Vec<PathBuf> = sheet
        .samples()
        .map(|sample| filtered_output(out_root, &sample.name))
        .collect();
    let scratch = scratch_dir(out_root, COMBINED_REPORT_RULE);
    let output = stage_dir(out_root, COMBINED_REPORT_STAGE).join(QUAST_REPORT);

    let spec = CommandSpec::new(QUAST_TAG)
        .arg("-t")
        .arg(threads.to_string())
        .arg("-o")
        .arg(scratch.to_string_lossy())
        .args(options)
        .args(inputs.iter().map(|p| p.to_string_lossy().into_owned()));

    Ok(Task {
        rule: COMBINED_REPORT_RULE,
        sample: None,
        read_role: None,
        output: output.clone(),
        inputs,
        threads,
        mem_mb,
        action: TaskAction::Command {
            spec: wrap_for_mode(spec, prefix, threads, mem_mb),
            stage: vec![],
            publish: vec![(scratch.join(QUAST_REPORT), output)],
        },
    })
}

/// Genome completeness report (CheckM taxonomy workflow at genus rank):
/// one task per run. CheckM scans its bin directory non-recursively for
/// `*.fasta`, so every sample's filtered scaffolds are staged flat into a
/// scratch bins dir as `<sample>.fasta` before the tool runs.
fn completeness_task(
    config: &RunConfig,
    sheet: &SampleSheet,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Task, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "checkm")?;

    let genus = config.settings.get_str("genus").map(str::to_string).unwrap_or_else(|| {
        warn!("No genus configured; falling back to '{}'", DEFAULT_GENUS);
        DEFAULT_GENUS.to_string()
    });

    let inputs: Vec<PathBuf> = sheet
        .samples()
        .map(|sample| filtered_output(out_root, &sample.name))
        .collect();
    let scratch = scratch_dir(out_root, COMPLETENESS_RULE);
    let bins = scratch.join("bins");
    let stage: Vec<(PathBuf, PathBuf)> = sheet
        .samples()
        .map(|sample| {
            (
                filtered_output(out_root, &sample.name),
                bins.join(format!("{}.fasta", sample.name)),
            )
        })
        .collect();
    let output = stage_dir(out_root, COMPLETENESS_STAGE).join(CHECKM_REPORT);

    let spec = CommandSpec::new(CHECKM_TAG)
        .arg("taxonomy_wf")
        .arg("genus")
        .arg(&genus)
        .arg(bins.to_string_lossy())
        .arg(scratch.join("out").to_string_lossy())
        .arg("-x")
        .arg("fasta")
        .arg("-t")
        .arg(threads.to_string())
        .args(options)
        .arg("-f")
        .arg(scratch.join(CHECKM_REPORT).to_string_lossy());

    Ok(Task {
        rule: COMPLETENESS_RULE,
        sample: None,
        read_role: None,
        output: output.clone(),
        inputs,
        threads,
        mem_mb,
        action: TaskAction::Command {
            spec: wrap_for_mode(spec, prefix, threads, mem_mb),
            stage,
            publish: vec![(scratch.join(CHECKM_REPORT), output)],
        },
    })
}

/// Final run summary (multiQC) over every read report and per-sample
/// assembly report.
fn summary_task(
    config: &RunConfig,
    sheet: &SampleSheet,
    resources: (u64, u64),
    prefix: &Option<Vec<String>>,
) -> Result<Task, PipelineError> {
    let (threads, mem_mb) = resources;
    let out_root = &config.out_dir;
    let options = tool_options(&config.settings, "multiqc")?;

    let mut inputs = Vec::new();
    for sample in sheet.samples() {
        for role in ReadRole::TRIMMED {
            inputs.push(
                task_dir(out_root, READ_REPORT_STAGE, &sample.name, Some(role))
                    .join(format!("{}_{}_fastqc.zip", sample.name, role.tag())),
            );
        }
        inputs.push(task_dir(out_root, SAMPLE_REPORT_STAGE, &sample.name, None).join(QUAST_REPORT));
    }

    let scratch = scratch_dir(out_root, SUMMARY_RULE);
    let output = stage_dir(out_root, SUMMARY_STAGE).join(MULTIQC_REPORT);

    let spec = CommandSpec::new(MULTIQC_TAG)
        .arg(stage_dir(out_root, READ_REPORT_STAGE).to_string_lossy())
        .arg(stage_dir(out_root, SAMPLE_REPORT_STAGE).to_string_lossy())
        .arg("-o")
        .arg(scratch.to_string_lossy())
        .arg("-n")
        .arg(MULTIQC_REPORT)
        .args(options);

    Ok(Task {
        rule: SUMMARY_RULE,
        sample: None,
        read_role: None,
        output: output.clone(),
        inputs,
        threads,
        mem_mb,
        action: TaskAction::Command {
            spec: wrap_for_mode(spec, prefix, threads, mem_mb),
            stage: vec![],
            publish: vec![(scratch.join(MULTIQC_REPORT), output)],
        },
    })
}

/// Expands the full task graph for one run. Fails before any execution on
/// a missing configuration key, a sample missing a required read role, or
/// any structural defect the graph validation catches.
pub fn expand(config: &RunConfig, sheet: &SampleSheet) -> Result<TaskGraph, PipelineError> {
    // Resource lookups come first so a missing key fails before any output
    // path of that rule is computed.
    let mut resources = std::collections::HashMap::new();
    for rule in ALL_RULES {
        resources.insert(*rule, rule_resources(&config.settings, rule)?);
    }
    let min_len = config.settings.require_u64("filter.min_scaffold_length")?;
    let prefix = submit_prefix(config)?;

    let mut tasks = Vec::new();
    for sample in sheet.samples() {
        tasks.extend(trim_tasks(config, sample, resources[TRIM_RULE], &prefix)?);
        tasks.extend(read_report_tasks(config, sample, resources[READ_REPORT_RULE], &prefix)?);
        tasks.push(assemble_task(config, sample, resources[ASSEMBLE_RULE], &prefix)?);
        tasks.push(filter_task(config, sample, resources[FILTER_RULE], min_len));
        tasks.push(sample_report_task(config, sample, resources[SAMPLE_REPORT_RULE], &prefix)?);
    }
    tasks.push(combined_report_task(config, sheet, resources[COMBINED_REPORT_RULE], &prefix)?);
    tasks.push(completeness_task(config, sheet, resources[COMPLETENESS_RULE], &prefix)?);
    tasks.push(summary_task(config, sheet, resources[SUMMARY_RULE], &prefix)?);

    let raw_inputs: HashSet<PathBuf> = sheet
        .samples()
        .flat_map(|sample| sample.read_paths().cloned())
        .collect();

    TaskGraph::new(tasks, &raw_inputs)
}
