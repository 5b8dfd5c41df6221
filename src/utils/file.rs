// src/utils/file.rs: output tree path derivation and small file helpers

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::config::defs::WORK_DIR;
use crate::manifest::ReadRole;

/// Directory for one stage's artifacts: `<root>/<stage>`.
pub fn stage_dir(out_root: &Path, stage: &str) -> PathBuf {
    out_root.join(stage)
}

/// Per-task artifact directory: `<root>/<stage>/<sample>[_<role>]`.
/// Injective over (stage, sample, role), which is what keeps distinct
/// tasks from colliding on output paths.
pub fn task_dir(out_root: &Path, stage: &str, sample: &str, role: Option<ReadRole>) -> PathBuf {
    let leaf = match role {
        Some(role) => format!("{}_{}", sample, role.tag()),
        None => sample.to_string(),
    };
    out_root.join(stage).join(leaf)
}

/// Scratch directory for a task's unpublished intermediates:
/// `<root>/.work/<task id>`.
pub fn scratch_dir(out_root: &Path, task_id: &str) -> PathBuf {
    out_root.join(WORK_DIR).join(task_id.replace([':', '/'], "_"))
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1F, 0x8B]), // Gzip magic bytes
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn write_fasta_record<W: Write>(out: &mut W, head: &[u8], seq: &[u8]) -> io::Result<()> {
    out.write_all(b">")?;
    out.write_all(head)?;
    writeln!(out)?;
    out.write_all(seq)?;
    writeln!(out)?;
    Ok(())
}
