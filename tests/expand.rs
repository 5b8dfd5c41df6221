// Task graph expansion against the testable properties of the pipeline:
// counts, fan-in, path uniqueness, determinism, and expansion-time failure.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use tempfile::tempdir;

use asmqc_pipelines::config::defs::{PipelineError, RunConfig};
use asmqc_pipelines::config::settings::Settings;
use asmqc_pipelines::manifest::SampleSheet;
use asmqc_pipelines::pipelines::graph::TaskAction;
use asmqc_pipelines::{Arguments, RunMode};
use asmqc_pipelines::pipelines::assembly_qc::{
    self, ASSEMBLE_RULE, COMBINED_REPORT_RULE, COMPLETENESS_RULE, FILTER_RULE, READ_REPORT_RULE,
    SUMMARY_RULE, TRIM_RULE,
};

fn sheet_with_samples(names: &[&str]) -> SampleSheet {
    let dir = tempdir().unwrap();
    let path = dir.path().join("samples.json");
    let entries: Vec<String> = names
        .iter()
        .map(|name| {
            format!(
                r#""{name}": {{"R1": "/data/{name}_R1.fastq.gz", "R2": "/data/{name}_R2.fastq.gz"}}"#
            )
        })
        .collect();
    fs::write(&path, format!("{{{}}}", entries.join(","))).unwrap();
    SampleSheet::load(&path).unwrap()
}

fn test_config(out_dir: &str) -> RunConfig {
    RunConfig {
        out_dir: PathBuf::from(out_dir),
        args: Arguments::default(),
        settings: Settings::from_sources([Settings::defaults()]),
        max_cores: 8,
    }
}

#[test]
fn one_assembly_task_per_sample_and_one_combined_report() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2", "s3"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    let assemble: Vec<_> = graph
        .tasks()
        .iter()
        .filter(|t| t.rule == ASSEMBLE_RULE)
        .collect();
    assert_eq!(assemble.len(), 3);

    let combined: Vec<_> = graph
        .tasks()
        .iter()
        .filter(|t| t.rule == COMBINED_REPORT_RULE)
        .collect();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].inputs.len(), 3);
    for sample in ["s1", "s2", "s3"] {
        assert!(
            combined[0]
                .inputs
                .iter()
                .any(|input| input.to_string_lossy().contains(sample)),
            "combined report misses {}",
            sample
        );
    }
    Ok(())
}

#[test]
fn role_parameterized_rules_expand_to_four_distinct_tasks() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    for rule in [TRIM_RULE, READ_REPORT_RULE] {
        for sample in ["s1", "s2"] {
            let outputs: HashSet<_> = graph
                .tasks()
                .iter()
                .filter(|t| t.rule == rule && t.sample.as_deref() == Some(sample))
                .map(|t| t.output.clone())
                .collect();
            assert_eq!(outputs.len(), 4, "rule {} for {}", rule, sample);
        }
    }
    Ok(())
}

#[test]
fn aggregate_rules_expand_exactly_once() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2", "s3", "s4"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    for rule in [COMBINED_REPORT_RULE, COMPLETENESS_RULE, SUMMARY_RULE] {
        let count = graph.tasks().iter().filter(|t| t.rule == rule).count();
        assert_eq!(count, 1, "rule {}", rule);
    }
    Ok(())
}

#[test]
fn expansion_is_deterministic() -> Result<()> {
    let sheet = sheet_with_samples(&["alpha", "beta", "gamma"]);
    let config = test_config("/out");

    let first = assembly_qc::expand(&config, &sheet)?.output_paths();
    let second = assembly_qc::expand(&config, &sheet)?.output_paths();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn no_two_tasks_collide_on_output_path() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2", "s3"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    let paths = graph.output_paths();
    let unique: HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());
    Ok(())
}

// Per sample: 4 trim + 4 read-report + 1 assemble + 1 filter + 1 quast,
// plus the 3 per-run aggregates.
#[test]
fn two_sample_graph_has_full_task_complement() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    assert_eq!(graph.len(), 25);
    let paths = graph.output_paths();
    let unique: HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), 25);
    Ok(())
}

#[test]
fn completeness_report_stages_bins_into_a_flat_dir() -> Result<()> {
    let sheet = sheet_with_samples(&["s1", "s2"]);
    let config = test_config("/out");
    let graph = assembly_qc::expand(&config, &sheet)?;

    let task = graph
        .tasks()
        .iter()
        .find(|t| t.rule == COMPLETENESS_RULE)
        .unwrap();
    let TaskAction::Command { spec, stage, .. } = &task.action else {
        panic!("completeness report must be a command task");
    };

    // One staged bin per sample, all side by side in one directory, named
    // after the sample so checkm's report rows are distinguishable.
    assert_eq!(stage.len(), 2);
    let bins_dir = stage[0].1.parent().unwrap();
    for (source, dest) in stage {
        assert!(source.to_string_lossy().contains("filtered"));
        assert_eq!(dest.parent().unwrap(), bins_dir);
    }
    let staged_names: HashSet<_> = stage
        .iter()
        .map(|(_, dest)| dest.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(staged_names, HashSet::from(["s1.fasta".to_string(), "s2.fasta".to_string()]));

    // The command reads the staged bins dir, not the nested filtered stage.
    assert!(spec.args.iter().any(|arg| arg == &bins_dir.to_string_lossy()));
    Ok(())
}

#[test]
fn cluster_mode_wraps_commands_with_submit_prefix() -> Result<()> {
    let sheet = sheet_with_samples(&["s1"]);
    let config = RunConfig {
        out_dir: PathBuf::from("/out"),
        args: Arguments {
            mode: RunMode::Cluster,
            queue: Some("short".to_string()),
            ..Arguments::default()
        },
        settings: Settings::from_sources([Settings::defaults()]),
        max_cores: 8,
    };
    let graph = assembly_qc::expand(&config, &sheet)?;

    let assemble = graph
        .tasks()
        .iter()
        .find(|t| t.rule == ASSEMBLE_RULE)
        .unwrap();
    let TaskAction::Command { spec, .. } = &assemble.action else {
        panic!("assemble must be a command task");
    };
    assert_eq!(spec.program, "srun");
    assert_eq!(spec.args[..6], ["-p", "short", "-c", "16", "--mem", "65536M"]);
    assert_eq!(spec.args[6], "spades.py");
    Ok(())
}

#[test]
fn missing_r2_fails_at_expansion_time() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("samples.json");
    fs::write(&path, r#"{"s1": {"R1": "/data/s1_R1.fastq.gz"}}"#).unwrap();
    let sheet = SampleSheet::load(&path).unwrap();

    let config = test_config("/out");
    let err = assembly_qc::expand(&config, &sheet).unwrap_err();
    match err {
        PipelineError::GraphExpansion(message) => {
            assert!(message.contains("R2"), "message: {}", message);
            assert!(message.contains("s1"), "message: {}", message);
        }
        other => panic!("expected GraphExpansion, got {}", other),
    }
}

#[test]
fn missing_rule_resources_fail_naming_the_key() {
    let sheet = sheet_with_samples(&["s1"]);
    let mut defaults = Settings::defaults();
    defaults["rules"]["assemble"]
        .as_object_mut()
        .unwrap()
        .remove("threads");
    let config = RunConfig {
        out_dir: PathBuf::from("/out"),
        args: Arguments::default(),
        settings: Settings::from_sources([defaults]),
        max_cores: 8,
    };

    let err = assembly_qc::expand(&config, &sheet).unwrap_err();
    match err {
        PipelineError::ConfigKeyMissing(key) => assert_eq!(key, "rules.assemble.threads"),
        other => panic!("expected ConfigKeyMissing, got {}", other),
    }
}

#[test]
fn missing_filter_threshold_fails_naming_the_key() {
    let sheet = sheet_with_samples(&["s1"]);
    let mut defaults = Settings::defaults();
    defaults.as_object_mut().unwrap().remove("filter");
    let config = RunConfig {
        out_dir: PathBuf::from("/out"),
        args: Arguments::default(),
        settings: Settings::from_sources([defaults]),
        max_cores: 8,
    };

    let err = assembly_qc::expand(&config, &sheet).unwrap_err();
    match err {
        PipelineError::ConfigKeyMissing(key) => assert_eq!(key, "filter.min_scaffold_length"),
        other => panic!("expected ConfigKeyMissing, got {}", other),
    }
}

// The single-sample scenario: one filtered-scaffold output for s1, one
// combined report fanning in over it, zero collisions in the path set.
#[test]
fn single_sample_scenario() -> Result<()> {
    let dir = tempdir().unwrap();
    let path = dir.path().join("samples.json");
    fs::write(&path, r#"{"s1": {"R1": "a_R1.fastq", "R2": "a_R2.fastq"}}"#).unwrap();
    let sheet = SampleSheet::load(&path).unwrap();

    let config = RunConfig {
        out_dir: PathBuf::from("/out"),
        args: Arguments::default(),
        settings: Settings::from_sources([
            Settings::defaults(),
            serde_json::json!({"filter": {"min_scaffold_length": 500}}),
        ]),
        max_cores: 8,
    };
    let graph = assembly_qc::expand(&config, &sheet)?;

    let filtered: Vec<_> = graph
        .tasks()
        .iter()
        .filter(|t| t.rule == FILTER_RULE)
        .collect();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].sample.as_deref(), Some("s1"));
    assert_eq!(filtered[0].output, PathBuf::from("/out/filtered/s1/scaffolds.fasta"));

    let combined: Vec<_> = graph
        .tasks()
        .iter()
        .filter(|t| t.rule == COMBINED_REPORT_RULE)
        .collect();
    assert_eq!(combined.len(), 1);
    assert_eq!(combined[0].inputs, vec![PathBuf::from("/out/filtered/s1/scaffolds.fasta")]);

    let paths = graph.output_paths();
    let unique: HashSet<_> = paths.iter().collect();
    assert_eq!(unique.len(), paths.len());
    Ok(())
}
