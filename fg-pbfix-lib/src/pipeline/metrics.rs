use super::stage::StageOutcome;
use crate::util::io::BUFFER_SIZE;
use anyhow::{Context, Result};
use fgoxide::io::{DelimFile, Io};
use serde::{Deserialize, Serialize};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// One row of the `<base>.epochs.tsv` file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// The 1-based epoch.
    pub epoch: usize,
    /// The reads aligned in this epoch.
    pub input: String,
    /// The number of reads in `input`; empty when the input did not exist yet (dry-run).
    pub input_reads: Option<u64>,
    pub stages_run: usize,
    pub stages_skipped: usize,
}

impl EpochMetrics {
    /// The column names, in the order the fields are serialized.
    pub const HEADER: [&'static str; 5] =
        ["epoch", "input", "input_reads", "stages_run", "stages_skipped"];

    pub fn new(epoch: usize, input: &Path, input_reads: Option<u64>) -> Self {
        Self {
            epoch,
            input: input.display().to_string(),
            input_reads,
            stages_run: 0,
            stages_skipped: 0,
        }
    }

    /// Tallies the outcome of one stage.  Planned stages are not counted.
    pub fn record(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Ran => self.stages_run += 1,
            StageOutcome::Skipped => self.stages_skipped += 1,
            StageOutcome::Planned => (),
        }
    }
}

/// What a pipeline run did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    /// One entry per epoch that was started.
    pub epochs: Vec<EpochMetrics>,
    /// The merged BAM, if any epoch ran.
    pub merged_bam: Option<PathBuf>,
}

/// Writes the metrics as TSV.  The header is written even when there are no rows.
pub fn write_metrics(path: &Path, epochs: &[EpochMetrics]) -> Result<()> {
    if epochs.is_empty() {
        let mut writer = Io::new(5, BUFFER_SIZE)
            .new_writer(&path)
            .with_context(|| format!("Error writing metrics: {}", path.display()))?;
        writeln!(writer, "{}", EpochMetrics::HEADER.join("\t"))
            .and_then(|()| writer.flush())
            .with_context(|| format!("Error writing metrics: {}", path.display()))?;
    } else {
        DelimFile::default()
            .write_tsv(&path, epochs)
            .with_context(|| format!("Error writing metrics: {}", path.display()))?;
    }
    Ok(())
}
