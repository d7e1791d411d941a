//! Iterative alignment and correction of long reads.
//!
//! Each epoch aligns the current reads with gmap, sorts and indexes the alignments, and runs
//! `cleanAlignments.py` to correct indels and mismatches and to drop alignments with too high
//! an edit distance.  The corrected reads become the input of the next epoch.  The pipeline
//! stops after the configured number of epochs, or earlier once no reads remain, and finally
//! merges the kept alignments of every epoch into a single coordinate sorted BAM.
pub mod layout;
pub mod metrics;
pub mod stage;
pub mod stages;

use crate::{
    tools::Tools,
    util::io::{base_name, count_reads},
};
use anyhow::{bail, ensure, Context, Result};
use derive_builder::Builder;
use derive_getters::Getters;
use layout::RunLayout;
use log::{info, warn};
use metrics::{write_metrics, EpochMetrics, RunSummary};
use stage::{ExistingOutputs, Stage, StageRunner};
use stages::{AlignStage, CleanStage, ConvertStage, MergeStage};
use std::{fs, path::PathBuf};

/// The default output directory.
pub const DEFAULT_OUT_DIR: &str = "filtered";

/// Configuration of a pipeline run.  Construct with [`PipelineBuilder`].
#[derive(Clone, Debug, Builder, Getters)]
#[builder(
    name = "PipelineBuilder",
    build_fn(name = "build_options", validate = "Self::validate")
)]
pub struct Options {
    /// The directory containing gmap indexes (`gmap -D`).
    #[builder(setter(into))]
    indexes_dir: PathBuf,
    /// The name of the gmap index (`gmap -d`).
    #[builder(setter(into))]
    index_name: String,
    /// The reference FASTA used to correct alignments.
    #[builder(setter(into))]
    reference: PathBuf,
    /// The reads to align in the first epoch.
    #[builder(setter(into))]
    reads: PathBuf,
    #[builder(setter(into), default = "PathBuf::from(DEFAULT_OUT_DIR)")]
    out_dir: PathBuf,
    #[builder(default = "3")]
    iterations: usize,
    /// The maximum edit distance of a kept alignment, as a fraction of its length.
    #[builder(default = "0.10")]
    edit_distance_ratio: f64,
    #[builder(default = "1")]
    threads: usize,
    /// The maximum intron length for gmap.
    #[builder(default = "8000")]
    max_intron: u32,
    #[builder(default = "false")]
    verbose: bool,
    /// Passed to `cleanAlignments.py -t` on the last epoch (`0` otherwise).
    #[builder(default = "40")]
    final_clean_threshold: u32,
    /// Passed to `cleanAlignments.py -a` on the first epoch.
    #[builder(default = "10")]
    first_clean_anchor: u32,
    #[builder(default)]
    existing: ExistingOutputs,
    #[builder(default = "false")]
    dry_run: bool,
    #[builder(default)]
    tools: Tools,
}

impl PipelineBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(iterations) = self.iterations {
            if iterations == 0 {
                return Err("iterations must be at least 1".to_string());
            }
        }
        if let Some(ratio) = self.edit_distance_ratio {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(format!("edit distance ratio must be in (0, 1], found {ratio}"));
            }
        }
        if let Some(threads) = self.threads {
            if threads == 0 {
                return Err("threads must be at least 1".to_string());
            }
        }
        if let Some(max_intron) = self.max_intron {
            if max_intron == 0 {
                return Err("max intron length must be at least 1".to_string());
            }
        }
        if let Some(index_name) = &self.index_name {
            if index_name.is_empty() {
                return Err("index name must not be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Result<Pipeline> {
        let opts = self.build_options()?;
        Ok(Pipeline { opts })
    }
}

/// The iterative align, convert, clean pipeline.
#[derive(Clone, Debug)]
pub struct Pipeline {
    opts: Options,
}

impl Pipeline {
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Checks that the inputs exist before any tool is run.
    fn check_inputs(&self) -> Result<()> {
        let opts = &self.opts;
        ensure!(
            opts.reads.is_file(),
            "Reads file does not exist: {}",
            opts.reads.display()
        );
        ensure!(
            opts.reference.is_file(),
            "Reference file does not exist: {}",
            opts.reference.display()
        );
        ensure!(
            opts.indexes_dir.is_dir(),
            "gmap indexes directory does not exist: {}",
            opts.indexes_dir.display()
        );
        let index = opts.indexes_dir.join(&opts.index_name);
        ensure!(
            index.is_dir(),
            "gmap index '{}' not found in: {}",
            opts.index_name,
            opts.indexes_dir.display()
        );
        if opts.threads > num_cpus::get() {
            warn!(
                "Requested {} threads but only {} CPUs are available",
                opts.threads,
                num_cpus::get()
            );
        }
        Ok(())
    }

    /// Runs every epoch and the final merge.
    pub fn run(&self) -> Result<RunSummary> {
        let opts = &self.opts;
        if !opts.dry_run {
            self.check_inputs()?;
            fs::create_dir_all(&opts.out_dir).with_context(|| {
                format!("Error creating output directory: {}", opts.out_dir.display())
            })?;
        }
        let base = base_name(&opts.reads)?;
        let layout = RunLayout::new(&opts.out_dir, &base);
        let runner = StageRunner::new(&layout.state_dir(), opts.existing, opts.dry_run);

        let mut epochs: Vec<EpochMetrics> = Vec::with_capacity(opts.iterations);
        let mut filtered_bams: Vec<PathBuf> = Vec::with_capacity(opts.iterations);
        let mut reads = opts.reads.clone();
        for epoch in 1..=opts.iterations {
            let input_reads = if reads.exists() {
                match count_reads(&reads) {
                    Ok(0) => {
                        info!(
                            "No reads remain in {}; stopping after {} epoch(s)",
                            reads.display(),
                            epoch - 1
                        );
                        break;
                    }
                    Ok(n) => Some(n),
                    Err(e) => {
                        warn!("Could not count the reads in {}: {e:#}", reads.display());
                        None
                    }
                }
            } else if opts.dry_run {
                None
            } else {
                bail!("Reads for epoch {epoch} do not exist: {}", reads.display());
            };

            match input_reads {
                Some(n) => info!(
                    "Starting epoch {epoch} of {} with {n} reads",
                    opts.iterations
                ),
                None => info!("Starting epoch {epoch} of {}", opts.iterations),
            }

            let files = layout.epoch(epoch);
            let align = AlignStage {
                opts,
                reads: &reads,
                files: &files,
            };
            let convert = ConvertStage::new(
                format!("convert-r{epoch}"),
                opts,
                files.raw_sam(),
                files.raw_bam(),
            );
            let clean = CleanStage {
                opts,
                files: &files,
            };
            let filter = ConvertStage::new(
                format!("filter-r{epoch}"),
                opts,
                files.fixed_sam(),
                files.filtered_bam(),
            );
            let stages: [&dyn Stage; 4] = [&align, &convert, &clean, &filter];

            let mut metrics = EpochMetrics::new(epoch, &reads, input_reads);
            for stage in stages {
                metrics.record(runner.run(stage)?);
            }
            epochs.push(metrics);
            filtered_bams.push(files.filtered_bam());
            reads = files.fixed_fasta();
        }

        let merged_bam = if filtered_bams.is_empty() {
            warn!(
                "No epochs were run because {} holds no reads; no merged BAM was written",
                opts.reads.display()
            );
            None
        } else {
            let merge = MergeStage {
                opts,
                bams: &filtered_bams,
                merged: layout.merged_bam(),
            };
            runner.run(&merge)?;
            Some(layout.merged_bam())
        };

        if !opts.dry_run {
            write_metrics(&layout.metrics(), &epochs)?;
        }
        runner.finish()?;

        match &merged_bam {
            Some(bam) => info!(
                "Finished {} epoch(s); alignments in {}",
                epochs.len(),
                bam.display()
            ),
            None => info!("Finished without aligning any reads"),
        }
        Ok(RunSummary { epochs, merged_bam })
    }
}
