// src/manifest.rs: sample sheet model, loader, and input-directory scanner

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::config::defs::{FASTQ_EXTS, GZIP_EXT, PipelineError};

/// Tag distinguishing raw, trimmed-paired and trimmed-unpaired read files,
/// forward and reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadRole {
    R1,
    R2,
    PR1,
    PR2,
    UR1,
    UR2,
}

impl ReadRole {
    /// The four roles trimming emits, in stable order.
    pub const TRIMMED: [ReadRole; 4] = [ReadRole::PR1, ReadRole::PR2, ReadRole::UR1, ReadRole::UR2];

    pub fn tag(&self) -> &'static str {
        match self {
            ReadRole::R1 => "R1",
            ReadRole::R2 => "R2",
            ReadRole::PR1 => "pR1",
            ReadRole::PR2 => "pR2",
            ReadRole::UR1 => "uR1",
            ReadRole::UR2 => "uR2",
        }
    }

    pub fn from_tag(tag: &str) -> Option<ReadRole> {
        match tag {
            "R1" => Some(ReadRole::R1),
            "R2" => Some(ReadRole::R2),
            "pR1" => Some(ReadRole::PR1),
            "pR2" => Some(ReadRole::PR2),
            "uR1" => Some(ReadRole::UR1),
            "uR2" => Some(ReadRole::UR2),
            _ => None,
        }
    }
}

/// One specimen's input read files, keyed by role.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    reads: BTreeMap<ReadRole, PathBuf>,
}

impl Sample {
    pub fn read(&self, role: ReadRole) -> Option<&PathBuf> {
        self.reads.get(&role)
    }

    /// Read path for a role a rule depends on. Absence is an expansion-time
    /// failure, never a runtime stall.
    pub fn require_read(&self, role: ReadRole, rule: &str) -> Result<&PathBuf, PipelineError> {
        self.reads.get(&role).ok_or_else(|| {
            PipelineError::GraphExpansion(format!(
                "sample '{}' is missing read role '{}' required by rule '{}'",
                self.name,
                role.tag(),
                rule
            ))
        })
    }

    pub fn read_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.reads.values()
    }
}

/// The sample manifest for one run: sample identifier to read files.
/// Immutable after load; ordering is deterministic (sorted by name).
#[derive(Debug, Clone)]
pub struct SampleSheet {
    samples: BTreeMap<String, Sample>,
}

impl SampleSheet {
    /// Parses a sample sheet JSON document of the form
    /// `{"sample": {"R1": "path", "R2": "path"}}`.
    ///
    /// Referenced file paths are not stat-checked here; a task that needs a
    /// missing file surfaces that at execution time.
    pub fn load(path: &Path) -> Result<SampleSheet, PipelineError> {
        let text = fs::read_to_string(path).map_err(|e| PipelineError::ManifestParse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let raw: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_str(&text)
            .map_err(|e| PipelineError::ManifestParse {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        let mut samples = BTreeMap::new();
        for (name, entries) in raw {
            let mut reads = BTreeMap::new();
            for (tag, file) in entries {
                let role = ReadRole::from_tag(&tag).ok_or_else(|| PipelineError::ManifestParse {
                    path: path.to_path_buf(),
                    error: format!("sample '{}' has unknown read role tag '{}'", name, tag),
                })?;
                reads.insert(role, PathBuf::from(file));
            }
            samples.insert(name.clone(), Sample { name, reads });
        }

        if samples.is_empty() {
            return Err(PipelineError::ManifestEmpty(path.to_path_buf()));
        }
        Ok(SampleSheet { samples })
    }

    /// Builds a sheet by scanning `input_dir` for paired FASTQ files whose
    /// names carry an R1 tag with a matching R2 partner. Unpaired or
    /// unrecognizable files are skipped with a warning.
    pub fn generate(input_dir: &Path) -> Result<SampleSheet, PipelineError> {
        let mut samples = BTreeMap::new();
        for entry in fs::read_dir(input_dir)? {
            let entry = entry?;
            if !entry.path().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_fastq_name(&name) {
                continue;
            }
            let Some((sample, r2_name)) = r1_partner(&name) else {
                continue;
            };
            let r2_path = input_dir.join(&r2_name);
            if !r2_path.is_file() {
                warn!("{}: no R2 partner '{}' found, skipping", name, r2_name);
                continue;
            }
            if samples.contains_key(&sample) {
                warn!("duplicate sample '{}' from {}, keeping first pair", sample, name);
                continue;
            }
            let mut reads = BTreeMap::new();
            reads.insert(ReadRole::R1, entry.path());
            reads.insert(ReadRole::R2, r2_path);
            samples.insert(sample.clone(), Sample { name: sample, reads });
        }

        if samples.is_empty() {
            return Err(PipelineError::ManifestEmpty(input_dir.to_path_buf()));
        }
        info!("Found {} paired-read sample(s) in {}", samples.len(), input_dir.display());
        Ok(SampleSheet { samples })
    }

    /// Serializes the sheet back to the on-disk JSON form.
    pub fn write(&self, path: &Path) -> Result<(), PipelineError> {
        let mut raw: BTreeMap<&str, BTreeMap<&str, String>> = BTreeMap::new();
        for sample in self.samples.values() {
            let entries = sample
                .reads
                .iter()
                .map(|(role, file)| (role.tag(), file.to_string_lossy().into_owned()))
                .collect();
            raw.insert(&sample.name, entries);
        }
        let text = serde_json::to_string_pretty(&raw)
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn samples(&self) -> impl Iterator<Item = &Sample> {
        self.samples.values()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Splits `<stem>.fastq[.gz]` / `<stem>.fq[.gz]` into stem and suffix.
fn split_fastq_suffix(name: &str) -> Option<(&str, &str)> {
    for ext in FASTQ_EXTS {
        for suffix in [format!(".{}", ext), format!(".{}.{}", ext, GZIP_EXT)] {
            if let Some(stem) = name.strip_suffix(&suffix) {
                let suffix_start = name.len() - suffix.len();
                return Some((stem, &name[suffix_start..]));
            }
        }
    }
    None
}

fn is_fastq_name(name: &str) -> bool {
    split_fastq_suffix(name).is_some()
}

/// Finds an R1 tag in a filename stem split on common delimiters. Returns
/// the sample prefix and the expected R2 partner filename.
fn r1_partner(name: &str) -> Option<(String, String)> {
    let (stem, suffix) = split_fastq_suffix(name)?;
    let delimiters = ['_', '.', '-'];
    for delimiter in delimiters {
        let parts: Vec<&str> = stem.split(delimiter).collect();
        for (index, part) in parts.iter().enumerate() {
            if *part == "R1" && index > 0 {
                let sample = parts[..index].join(&delimiter.to_string());
                let mut partner = parts.clone();
                partner[index] = "R2";
                return Some((sample, format!("{}{}", partner.join(&delimiter.to_string()), suffix)));
            }
        }
    }
    None
}
