// src/utils/fasta.rs: built-in scaffold length filter

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use log::debug;
use seq_io::fasta::{Reader, Record};
use tempfile::NamedTempFile;

use crate::config::defs::PipelineError;
use crate::utils::file::{is_gzipped, write_fasta_record};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterStats {
    pub kept: usize,
    pub dropped: usize,
}

/// Copies FASTA records of length >= `min_len` from `input` to `output`.
/// The boundary is inclusive: a record of exactly `min_len` is retained.
///
/// Input may be plain or gzip-compressed. The output is written to a
/// temp file in the destination directory and atomically renamed into
/// place on success, so a partially written file never masquerades as a
/// finished output.
pub fn filter_scaffolds(
    input: &Path,
    output: &Path,
    min_len: u64,
) -> Result<FilterStats, PipelineError> {
    let raw = File::open(input).map_err(|e| PipelineError::ToolExecution {
        tool: "filter".to_string(),
        error: format!("cannot open {}: {}", input.display(), e),
    })?;
    let source: Box<dyn Read> = if is_gzipped(input)? {
        Box::new(MultiGzDecoder::new(raw))
    } else {
        Box::new(raw)
    };
    let mut reader = Reader::new(BufReader::new(source));

    let out_dir = output.parent().ok_or_else(|| PipelineError::ToolExecution {
        tool: "filter".to_string(),
        error: format!("output path {} has no parent directory", output.display()),
    })?;
    std::fs::create_dir_all(out_dir)?;
    let mut tmp = NamedTempFile::new_in(out_dir)?;

    let mut stats = FilterStats { kept: 0, dropped: 0 };
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        while let Some(result) = reader.next() {
            let record = result.map_err(|e| PipelineError::ToolExecution {
                tool: "filter".to_string(),
                error: format!("malformed FASTA in {}: {}", input.display(), e),
            })?;
            let seq = record.full_seq();
            if seq.len() as u64 >= min_len {
                write_fasta_record(&mut writer, record.head(), &seq)?;
                stats.kept += 1;
            } else {
                stats.dropped += 1;
            }
        }
        writer.flush()?;
    }

    tmp.persist(output).map_err(|e| PipelineError::ToolExecution {
        tool: "filter".to_string(),
        error: format!("cannot publish {}: {}", output.display(), e),
    })?;

    debug!(
        "Filtered {}: kept {} scaffold(s), dropped {} below {} bp",
        input.display(),
        stats.kept,
        stats.dropped,
        min_len
    );
    Ok(stats)
}


#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::fs;
    use tempfile::tempdir;

    fn fasta_with_lengths(lengths: &[usize]) -> String {
        lengths
            .iter()
            .enumerate()
            .map(|(i, len)| format!(">scaffold_{} cov=1.0\n{}\n", i, "A".repeat(*len)))
            .collect()
    }

    #[test]
    fn boundary_length_is_retained() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("scaffolds.fasta");
        let output = dir.path().join("filtered.fasta");
        fs::write(&input, fasta_with_lengths(&[500, 499, 501])).unwrap();

        let stats = filter_scaffolds(&input, &output, 500).unwrap();
        assert_eq!(stats, FilterStats { kept: 2, dropped: 1 });

        let text = fs::read_to_string(&output).unwrap();
        assert!(text.contains(">scaffold_0"));
        assert!(!text.contains(">scaffold_1"));
        assert!(text.contains(">scaffold_2"));
    }

    #[test]
    fn gzipped_input_is_accepted() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("scaffolds.fasta.gz");
        let output = dir.path().join("filtered.fasta");
        let mut encoder = GzEncoder::new(File::create(&input).unwrap(), Compression::default());
        encoder
            .write_all(fasta_with_lengths(&[100, 10]).as_bytes())
            .unwrap();
        encoder.finish().unwrap();

        let stats = filter_scaffolds(&input, &output, 50).unwrap();
        assert_eq!(stats, FilterStats { kept: 1, dropped: 1 });
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("scaffolds.fasta");
        let output = dir.path().join("filtered.fasta");
        fs::write(&input, "").unwrap();

        let stats = filter_scaffolds(&input, &output, 500).unwrap();
        assert_eq!(stats, FilterStats { kept: 0, dropped: 0 });
        assert_eq!(fs::read_to_string(&output).unwrap(), "");
    }

    #[test]
    fn header_and_description_survive() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("scaffolds.fasta");
        let output = dir.path().join("filtered.fasta");
        fs::write(&input, ">node_1 length=20\nACGTACGTACGTACGTACGT\n").unwrap();

        filter_scaffolds(&input, &output, 20).unwrap();
        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(text, ">node_1 length=20\nACGTACGTACGTACGTACGT\n");
    }
}
