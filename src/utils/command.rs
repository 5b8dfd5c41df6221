/// Functions for working with the external tool command lines

use anyhow::{Result, anyhow};
use log::{debug, warn};
use tokio::process::Command;

use crate::config::defs::{
    CHECKM_TAG, FASTQC_TAG, MULTIQC_TAG, QUAST_TAG, SPADES_TAG, TOOL_VERSIONS, TRIMMOMATIC_TAG,
    PipelineError,
};
use crate::config::settings::Settings;

/// Splits a tool's configured option string into argv tokens. The key is
/// `tools.<name>.options`; absence is a configuration error.
pub fn tool_options(settings: &Settings, tool: &str) -> Result<Vec<String>, PipelineError> {
    let options = settings.require_str(&format!("tools.{}.options", tool))?;
    Ok(options.split_whitespace().map(str::to_string).collect())
}

async fn version_first_line(tool: &str, flag: &str) -> Result<String> {
    let output = Command::new(tool)
        .arg(flag)
        .output()
        .await
        .map_err(|e| anyhow!("Failed to spawn {}: {}. Is {} installed?", tool, e, tool))?;

    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).into_owned()
    } else {
        String::from_utf8_lossy(&output.stdout).into_owned()
    };
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No output from {} {}", tool, flag))
}

/// Extracts a version string from a tool's version banner.
pub async fn check_version(tool: &str) -> Result<String> {
    let (flag, field) = match tool {
        TRIMMOMATIC_TAG => ("-version", 0),
        SPADES_TAG => ("--version", 3),
        QUAST_TAG => ("--version", 1),
        CHECKM_TAG => ("-h", 1),
        FASTQC_TAG => ("--version", 1),
        MULTIQC_TAG => ("--version", 2),
        _ => return Err(anyhow!("Unknown tool: {}", tool)),
    };

    let first_line = version_first_line(tool, flag).await?;
    let version = first_line
        .split_whitespace()
        .nth(field)
        .ok_or_else(|| anyhow!("Invalid {} version output: {}", tool, first_line))?
        .trim_start_matches('v')
        .to_string();
    if version.is_empty() {
        return Err(anyhow!("Empty version number in {} output: {}", tool, first_line));
    }
    Ok(version)
}

/// Probes every tool the expanded graph will invoke, concurrently.
/// Missing tools are reported but not fatal here; a cached re-run may
/// never need them.
pub async fn check_versions(tools: &[&str]) {
    let probes = tools.iter().map(|tool| check_version(tool));
    let results = futures::future::join_all(probes).await;
    for (tool, result) in tools.iter().zip(results) {
        match result {
            Ok(version) => {
                debug!("{} version {}", tool, version);
                if let (Some(min), Ok(found)) =
                    (TOOL_VERSIONS.get(tool), version.split('.').take(2).collect::<Vec<_>>().join(".").parse::<f32>())
                {
                    if found < *min {
                        warn!("{} version {} is below the tested minimum {}", tool, version, min);
                    }
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}
