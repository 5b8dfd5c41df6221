mod cli;
mod config;
mod executor;
mod manifest;
mod pipelines;
mod utils;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{LevelFilter, debug, error, info, warn};
use serde_json::Value;

use crate::cli::parse;
use crate::config::defs::{
    METADATA_EXT, PipelineError, RunConfig, SAMPLE_SHEET_NAME, TRIMMOMATIC_TAG, SPADES_TAG,
    QUAST_TAG, CHECKM_TAG, FASTQC_TAG, MULTIQC_TAG,
};
use crate::config::settings::Settings;
use crate::manifest::SampleSheet;
use crate::pipelines::assembly_qc;
use crate::utils::command::check_versions;
use crate::utils::system::{detect_cores, write_run_info};


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    println!("\n-------------\n AsmQC\n-------------\n");

    if let Err(e) = run(args, run_start).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        std::process::exit(1);
    }

    println!("Run complete: {} milliseconds.", run_start.elapsed().as_millis());
    Ok(())
}

async fn run(args: cli::Arguments, run_start: Instant) -> Result<(), PipelineError> {
    let cwd = std::env::current_dir()?;
    info!("The current directory is {:?}", cwd);

    let out_dir = resolve_out_dir(&args, &cwd);

    if args.clean {
        return clean_output(&out_dir, args.skip_confirmation);
    }

    if let Some(metadata) = &args.metadata {
        validate_metadata(Path::new(metadata))?;
    }

    fs::create_dir_all(&out_dir)?;

    let sheet = load_or_generate_sheet(&args, &cwd, &out_dir)?;
    info!("Sample sheet holds {} sample(s)", sheet.len());

    if args.sample_sheet_only {
        info!("Sample sheet ready; stopping as requested (--sample-sheet-only)");
        return Ok(());
    }

    let settings = build_settings(&args)?;
    let max_cores = detect_cores(args.cores);
    debug!("Using up to {} core(s) for concurrent tasks", max_cores);

    if let Some(metadata) = &args.metadata {
        let dest = out_dir.join(Path::new(metadata).file_name().unwrap_or_default());
        fs::copy(metadata, &dest)?;
        debug!("Copied run metadata to {}", dest.display());
    }

    let config = Arc::new(RunConfig {
        out_dir,
        args,
        settings,
        max_cores,
    });

    let graph = assembly_qc::expand(&config, &sheet)?;
    info!("Expanded {} task(s) across {} sample(s)", graph.len(), sheet.len());

    write_run_info(
        &config.out_dir,
        config.settings.get_str("genus"),
        config.args.mode,
    )?;

    if !config.args.skip_confirmation && !confirm_run(&graph)? {
        info!("Run aborted at the confirmation prompt");
        return Ok(());
    }

    check_versions(&[
        TRIMMOMATIC_TAG,
        SPADES_TAG,
        QUAST_TAG,
        CHECKM_TAG,
        FASTQC_TAG,
        MULTIQC_TAG,
    ])
    .await;

    let summary = executor::run_graph(config, &graph).await?;
    info!(
        "Executed {} task(s), skipped {} up-to-date task(s) in {} milliseconds",
        summary.executed,
        summary.skipped,
        run_start.elapsed().as_millis()
    );
    Ok(())
}

/// Output directory from args, or `asmqc_YYYYMMDD` under the cwd.
fn resolve_out_dir(args: &cli::Arguments, cwd: &Path) -> PathBuf {
    match &args.out_dir {
        Some(out) => {
            let path = PathBuf::from(out);
            if path.is_absolute() { path } else { cwd.join(path) }
        }
        None => {
            let stamp = chrono::Local::now().format("%Y%m%d");
            cwd.join(format!("asmqc_{}", stamp))
        }
    }
}

fn clean_output(out_dir: &Path, skip_confirmation: bool) -> Result<(), PipelineError> {
    if !out_dir.exists() {
        info!("Nothing to clean: {} does not exist", out_dir.display());
        return Ok(());
    }
    if !skip_confirmation {
        print!("Remove {} and everything under it? [y/N] ", out_dir.display());
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if !answer.trim().eq_ignore_ascii_case("y") {
            info!("Clean aborted");
            return Ok(());
        }
    }
    fs::remove_dir_all(out_dir)?;
    info!("Removed {}", out_dir.display());
    Ok(())
}

fn validate_metadata(path: &Path) -> Result<(), PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::Validation(format!(
            "metadata file {} does not exist",
            path.display()
        )));
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(METADATA_EXT) => Ok(()),
        _ => Err(PipelineError::Validation(format!(
            "metadata file {} must have a .{} extension",
            path.display(),
            METADATA_EXT
        ))),
    }
}

/// Loads the given sample sheet, or scans the input directory and writes
/// the generated sheet next to the run outputs.
fn load_or_generate_sheet(
    args: &cli::Arguments,
    cwd: &Path,
    out_dir: &Path,
) -> Result<SampleSheet, PipelineError> {
    if let Some(sheet_path) = &args.sample_sheet {
        return SampleSheet::load(Path::new(sheet_path));
    }

    let input_dir = args.input_dir.as_ref().ok_or_else(|| {
        PipelineError::Validation(
            "either --input-dir or --sample-sheet is required".to_string(),
        )
    })?;
    let input_dir = {
        let path = PathBuf::from(input_dir);
        if path.is_absolute() { path } else { cwd.join(path) }
    };
    if !input_dir.is_dir() {
        return Err(PipelineError::Validation(format!(
            "input directory {} does not exist",
            input_dir.display()
        )));
    }

    let sheet = SampleSheet::generate(&input_dir)?;
    let sheet_path = out_dir.join(SAMPLE_SHEET_NAME);
    sheet.write(&sheet_path)?;
    info!("Wrote sample sheet to {}", sheet_path.display());
    Ok(sheet)
}

/// Defaults, then the optional user config document, then CLI overrides.
fn build_settings(args: &cli::Arguments) -> Result<Settings, PipelineError> {
    let mut sources: Vec<Value> = vec![Settings::defaults()];
    if let Some(config_path) = &args.config {
        sources.push(Settings::load_file(Path::new(config_path))?);
    }
    if let Some(genus) = &args.genus {
        sources.push(serde_json::json!({ "genus": genus }));
    }
    if !args.overrides.is_empty() {
        sources.push(Settings::overrides_from_pairs(&args.overrides)?);
    }
    Ok(Settings::from_sources(sources))
}

fn confirm_run(graph: &crate::pipelines::graph::TaskGraph) -> Result<bool, PipelineError> {
    print!("About to schedule {} task(s). Proceed? [y/N] ", graph.len());
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    if answer.trim().eq_ignore_ascii_case("y") {
        Ok(true)
    } else {
        warn!("Confirmation declined");
        Ok(false)
    }
}
