use std::collections::HashMap;
use std::path::PathBuf;
use lazy_static::lazy_static;
use thiserror::Error;

use crate::cli::Arguments;
use crate::config::settings::Settings;

// External software
pub const GZIP_EXT: &str = "gz";
pub const TRIMMOMATIC_TAG: &str = "trimmomatic";
pub const SPADES_TAG: &str = "spades.py";
pub const QUAST_TAG: &str = "quast.py";
pub const CHECKM_TAG: &str = "checkm";
pub const FASTQC_TAG: &str = "fastqc";
pub const MULTIQC_TAG: &str = "multiqc";


lazy_static! {
    pub static ref TOOL_VERSIONS: HashMap<&'static str, f32> = {
        let mut m = HashMap::new();
        m.insert(TRIMMOMATIC_TAG, 0.39);
        m.insert(SPADES_TAG, 3.15);
        m.insert(QUAST_TAG, 5.20);
        m.insert(CHECKM_TAG, 1.2);
        m.insert(FASTQC_TAG, 0.12);
        m.insert(MULTIQC_TAG, 1.14);

        m
    };
}

// Stage directory names under the output root
pub const TRIM_STAGE: &str = "trimmed";
pub const READ_REPORT_STAGE: &str = "fastqc";
pub const ASSEMBLY_STAGE: &str = "assembly";
pub const FILTER_STAGE: &str = "filtered";
pub const SAMPLE_REPORT_STAGE: &str = "quast";
pub const COMBINED_REPORT_STAGE: &str = "quast_combined";
pub const COMPLETENESS_STAGE: &str = "checkm";
pub const SUMMARY_STAGE: &str = "multiqc";
pub const WORK_DIR: &str = ".work";

// Static Filenames
pub const SCAFFOLDS_FASTA: &str = "scaffolds.fasta";
pub const QUAST_REPORT: &str = "report.tsv";
pub const CHECKM_REPORT: &str = "report.tsv";
pub const MULTIQC_REPORT: &str = "multiqc_report.html";
pub const SAMPLE_SHEET_NAME: &str = "samples.json";
pub const RUN_INFO_NAME: &str = "run_info.json";

// Static Parameters
pub const DEFAULT_GENUS: &str = "Escherichia";
pub const METADATA_EXT: &str = "csv";

pub const FASTQ_EXTS: &[&'static str] = &["fastq", "fq"];


#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Missing configuration key: {0}")]
    ConfigKeyMissing(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Malformed sample sheet {path}: {error}")]
    ManifestParse { path: PathBuf, error: String },

    #[error("Sample sheet {0} contains no samples")]
    ManifestEmpty(PathBuf),

    #[error("Task graph expansion failed: {0}")]
    GraphExpansion(String),

    #[error("{tool} failed: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct RunConfig {
    pub out_dir: PathBuf,
    pub args: Arguments,
    pub settings: Settings,
    pub max_cores: usize,
}
