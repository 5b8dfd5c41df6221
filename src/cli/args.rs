use clap::{Parser, ValueEnum};

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq)]
pub enum RunMode {
    #[default]
    Local,
    Cluster,
}

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "asmqc-pipelines", version = "0.1.0")]
pub struct Arguments {

    #[arg(short = 'i', long = "input-dir", help = "Directory of paired-end FASTQ files to assemble")]
    pub input_dir: Option<String>,

    #[arg(short = 'o', long = "out", help = "Output directory for all generated files. If not specified, a directory named 'asmqc_YYYYMMDD' will be created in the current working directory.")]
    pub out_dir: Option<String>,

    #[arg(short = 's', long = "sample-sheet", help = "Existing sample sheet JSON; generated by scanning --input-dir when absent")]
    pub sample_sheet: Option<String>,

    #[arg(short = 'g', long = "genus", help = "Taxonomic genus hint for the completeness report")]
    pub genus: Option<String>,

    #[arg(short = 'm', long = "metadata", help = "Run metadata file; must carry a .csv extension")]
    pub metadata: Option<String>,

    #[arg(long = "mode", default_value = "local", value_enum)]
    pub mode: RunMode,

    #[arg(short = 'c', long = "cores", default_value_t = 16, help = "Global core ceiling for concurrent tasks")]
    pub cores: usize,

    #[arg(short = 'q', long = "queue", help = "Cluster queue/partition name (cluster mode only)")]
    pub queue: Option<String>,

    #[arg(long = "config", help = "Extra configuration JSON merged over the built-in defaults")]
    pub config: Option<String>,

    #[arg(short = 'y', long = "yes", action, help = "Skip the pre-run confirmation prompt")]
    pub skip_confirmation: bool,

    #[arg(long, action, help = "Remove the output directory and exit")]
    pub clean: bool,

    #[arg(long = "sample-sheet-only", action, help = "Write the generated sample sheet and exit")]
    pub sample_sheet_only: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true, help = "key=value settings overrides, highest precedence (e.g. rules.assemble.threads=32)")]
    pub overrides: Vec<String>,
}
