use super::command::{Command, ValueEnum};
use anyhow::Result;
use clap::{
    builder::{PossibleValuesParser, TypedValueParser as _},
    Parser,
};
use itertools::Itertools;
use log::info;
use pbfix::{
    pipeline::{stage::ExistingOutputs, PipelineBuilder, DEFAULT_OUT_DIR},
    process::Tool,
    tools::{Tools, DEFAULT_CLEAN_ALIGNMENTS, DEFAULT_GMAP, DEFAULT_SAMTOOLS},
    util::version::built_info,
};
use std::{env, path::PathBuf};

impl ValueEnum for ExistingOutputs {
    fn variants<'a>() -> &'a [Self] {
        &[Self::Skip, Self::Overwrite, Self::Fail]
    }
}

/// Iteratively aligns PacBio reads with gmap and corrects them against the reference.
///
/// Each epoch aligns the current reads with gmap, coordinate sorts and indexes the alignments
/// with samtools, and runs `cleanAlignments.py` to correct indels and mismatches in the reads
/// and to drop alignments whose edit distance is too high.  The corrected reads are the input
/// of the next epoch.  The run stops after `--iterations` epochs, or earlier once no reads
/// remain, and the alignments kept in every epoch are merged into `<OUTDIR>/<BASE>.bam`, where
/// `<BASE>` is the file name of the reads up to the first `.`.
///
/// Every file is written into `--outdir`.  Re-running into the same directory skips steps whose
/// outputs are newer than their inputs (see `--existing`).
#[derive(Parser, Debug, Clone)]
#[clap(version = built_info::VERSION.as_str(), term_width=0)]
pub struct Align {
    /// The directory containing the gmap indexes.
    indexes_dir: PathBuf,

    /// The name of the gmap index to align against.
    index_name: String,

    /// The reference FASTA used to correct the alignments.
    reference: PathBuf,

    /// The reads to align, in FASTA or FASTQ format (optionally gzipped).
    reads: PathBuf,

    /// Log debug messages and pass `-v` to the cleaning script.
    #[clap(long, short = 'v', default_value = "false", display_order = 1)]
    verbose: bool,

    /// The maximum number of align and correct epochs.
    #[clap(long, short = 'i', default_value = "3", display_order = 2)]
    iterations: usize,

    /// The maximum edit distance of a kept alignment, as a fraction of its length.
    #[clap(long, short = 'e', default_value = "0.10", display_order = 3)]
    edr: f64,

    /// The directory to write all outputs into.
    #[clap(long, short = 'o', default_value = DEFAULT_OUT_DIR, display_order = 4)]
    outdir: PathBuf,

    /// The number of threads for gmap and samtools.
    #[clap(long, short = 'p', default_value = "1", display_order = 5)]
    procs: usize,

    /// The maximum intron length passed to gmap.
    #[clap(long, short = 'K', alias = "maxIntron", default_value = "8000", display_order = 6)]
    max_intron: u32,

    /// What to do with the outputs of steps that already exist.
    #[clap(
        long,
        value_parser = PossibleValuesParser::new(ExistingOutputs::possible_values())
            .map(|s| s.parse::<ExistingOutputs>().unwrap()),
        default_value_t = ExistingOutputs::Skip,
        ignore_case = true,
        display_order = 7
    )]
    existing: ExistingOutputs,

    /// Log the commands that would be run without running them.
    #[clap(long, default_value = "false", display_order = 8)]
    dry_run: bool,

    /// The threshold passed to the cleaning script (`-t`) on the last epoch.
    #[clap(long, default_value = "40", display_order = 9)]
    final_clean_threshold: u32,

    /// The anchor length passed to the cleaning script (`-a`) on the first epoch.
    #[clap(long, default_value = "10", display_order = 10)]
    first_clean_anchor: u32,

    /// The gmap executable.
    #[clap(long, default_value = DEFAULT_GMAP, display_order = 11)]
    gmap: PathBuf,

    /// The samtools executable.
    #[clap(long, default_value = DEFAULT_SAMTOOLS, display_order = 12)]
    samtools: PathBuf,

    /// The alignment cleaning script.
    #[clap(long, default_value = DEFAULT_CLEAN_ALIGNMENTS, display_order = 13)]
    clean_alignments: PathBuf,

    /// Run the cleaning script with this interpreter (e.g. `python3`) instead of directly.
    #[clap(long, display_order = 14)]
    interpreter: Option<PathBuf>,
}

impl Align {
    fn tools(&self) -> Tools {
        let clean_alignments = match &self.interpreter {
            Some(interpreter) => Tool::new(interpreter).with_args([&self.clean_alignments]),
            None => Tool::new(&self.clean_alignments),
        };
        Tools {
            gmap: Tool::new(&self.gmap),
            samtools: Tool::new(&self.samtools),
            clean_alignments,
        }
    }
}

impl Command for Align {
    fn execute(&self) -> Result<()> {
        let command_line = env::args_os()
            .map(|s| s.to_string_lossy().into_owned())
            .join(" ");
        info!("Running pbfix version {}", built_info::VERSION.as_str());
        info!("Command line: {command_line}");

        let pipeline = PipelineBuilder::default()
            .indexes_dir(&self.indexes_dir)
            .index_name(&self.index_name)
            .reference(&self.reference)
            .reads(&self.reads)
            .out_dir(&self.outdir)
            .iterations(self.iterations)
            .edit_distance_ratio(self.edr)
            .threads(self.procs)
            .max_intron(self.max_intron)
            .verbose(self.verbose)
            .final_clean_threshold(self.final_clean_threshold)
            .first_clean_anchor(self.first_clean_anchor)
            .existing(self.existing)
            .dry_run(self.dry_run)
            .tools(self.tools())
            .build()?;
        pipeline.run()?;
        Ok(())
    }

    fn verbose(&self) -> bool {
        self.verbose
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use pbfix::{pipeline::stage::ExistingOutputs, process::Tool};

    use super::Align;

    #[test]
    fn test_parse() {
        Align::parse_from(["align", "idx", "hg38", "ref.fa", "reads.fa"]);
    }

    #[test]
    fn test_parse_options() {
        let align = Align::parse_from([
            "align",
            "-v",
            "-i",
            "5",
            "-e",
            "0.2",
            "-o",
            "out",
            "-p",
            "4",
            "--maxIntron",
            "1000",
            "--existing",
            "OVERWRITE",
            "--clean-alignments",
            "scripts/cleanAlignments.py",
            "--interpreter",
            "python3",
            "idx",
            "hg38",
            "ref.fa",
            "reads.fq.gz",
        ]);
        assert!(align.verbose);
        assert_eq!(align.iterations, 5);
        assert_eq!(align.procs, 4);
        assert_eq!(align.max_intron, 1000);
        assert_eq!(align.existing, ExistingOutputs::Overwrite);
        let tools = align.tools();
        assert_eq!(
            tools.clean_alignments,
            Tool::new("python3").with_args(["scripts/cleanAlignments.py"])
        );
        assert_eq!(tools.gmap, Tool::new("gmap"));
    }

    #[test]
    fn test_parse_rejects_unknown_existing_policy() {
        let result = Align::try_parse_from([
            "align",
            "--existing",
            "ignore",
            "idx",
            "hg38",
            "ref.fa",
            "reads.fa",
        ]);
        assert!(result.is_err());
    }
}
