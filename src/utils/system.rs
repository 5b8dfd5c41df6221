// src/utils/system.rs: system probing and the persisted run audit record

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use log::info;
use serde::Serialize;
use sysinfo::System;

use crate::cli::RunMode;
use crate::config::defs::{PipelineError, RUN_INFO_NAME};

/// Core ceiling for the run: physical cores capped by the CLI request.
pub fn detect_cores(args_cores: usize) -> usize {
    let physical_cores = System::physical_core_count().unwrap_or(1);
    physical_cores.min(args_cores).max(1)
}

pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Audit trail written before execution starts. Never read back by the
/// pipeline itself.
#[derive(Debug, Serialize)]
pub struct RunInfo {
    pub run_id: String,
    pub host: String,
    pub started_at: String,
    pub genus: Option<String>,
    pub mode: String,
}

pub fn write_run_info(
    out_dir: &Path,
    genus: Option<&str>,
    mode: RunMode,
) -> Result<PathBuf, PipelineError> {
    let host = host_name();
    let now = Local::now();
    let info = RunInfo {
        run_id: format!("{}-{}", host, now.format("%Y%m%d%H%M%S")),
        host,
        started_at: now.to_rfc3339(),
        genus: genus.map(str::to_string),
        mode: format!("{:?}", mode).to_lowercase(),
    };

    let path = out_dir.join(RUN_INFO_NAME);
    let text = serde_json::to_string_pretty(&info)
        .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
    fs::write(&path, text)?;
    info!("Run {} recorded in {}", info.run_id, path.display());
    Ok(path)
}
