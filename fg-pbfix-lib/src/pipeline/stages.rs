//! The stages of an epoch, and the final merge.
use super::{
    layout::{bai_path, EpochLayout},
    stage::{Stage, Staging},
    Options,
};
use crate::{
    process::ToolCommand,
    tools::{clean::CleanCommand, gmap::GmapCommand, samtools},
};
use std::path::{Path, PathBuf};

/// Aligns the epoch's reads with gmap.
pub struct AlignStage<'a> {
    pub opts: &'a Options,
    pub reads: &'a Path,
    pub files: &'a EpochLayout,
}

impl Stage for AlignStage<'_> {
    fn name(&self) -> String {
        format!("align-r{}", self.files.epoch())
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.reads.to_path_buf()]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.files.raw_sam(), self.files.gmap_log()]
    }

    fn commands(&self, staging: &Staging) -> Vec<ToolCommand> {
        let gmap = GmapCommand {
            indexes_dir: &self.opts.indexes_dir,
            index_name: &self.opts.index_name,
            max_intron: self.opts.max_intron,
            threads: self.opts.threads,
            reads: self.reads,
            sam: staging.path(&self.files.raw_sam()),
            log: staging.path(&self.files.gmap_log()),
        };
        vec![gmap.build(&self.opts.tools.gmap)]
    }
}

/// Converts a SAM into a coordinate sorted and indexed BAM.
pub struct ConvertStage<'a> {
    name: String,
    opts: &'a Options,
    sam: PathBuf,
    bam: PathBuf,
}

impl<'a> ConvertStage<'a> {
    pub fn new(name: String, opts: &'a Options, sam: PathBuf, bam: PathBuf) -> Self {
        Self {
            name,
            opts,
            sam,
            bam,
        }
    }
}

impl Stage for ConvertStage<'_> {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.sam.clone()]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.bam.clone(), bai_path(&self.bam)]
    }

    fn commands(&self, staging: &Staging) -> Vec<ToolCommand> {
        let samtools = &self.opts.tools.samtools;
        let bam = staging.path(&self.bam);
        let bai = staging.path(&bai_path(&self.bam));
        vec![
            samtools::sort(samtools, self.opts.threads, &self.sam, &bam),
            samtools::index(samtools, &bam, &bai),
        ]
    }
}

/// Corrects and filters the epoch's alignments with `cleanAlignments.py`.
pub struct CleanStage<'a> {
    pub opts: &'a Options,
    pub files: &'a EpochLayout,
}

impl Stage for CleanStage<'_> {
    fn name(&self) -> String {
        format!("clean-r{}", self.files.epoch())
    }

    fn inputs(&self) -> Vec<PathBuf> {
        let bam = self.files.raw_bam();
        vec![bai_path(&bam), bam, self.opts.reference.clone()]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![
            self.files.fixed_fasta(),
            self.files.junctions_fasta(),
            self.files.fixed_sam(),
            self.files.unaligned_fasta(),
            self.files.filtered_fasta(),
        ]
    }

    fn commands(&self, staging: &Staging) -> Vec<ToolCommand> {
        let epoch = *self.files.epoch();
        // The threshold only applies on the last configured epoch, even if the pipeline later
        // stops early because no reads remain.
        let threshold = if epoch < self.opts.iterations {
            0
        } else {
            self.opts.final_clean_threshold
        };
        let anchor = (epoch == 1).then_some(self.opts.first_clean_anchor);
        let bam = self.files.raw_bam();
        let clean = CleanCommand {
            edit_distance_ratio: self.opts.edit_distance_ratio,
            threshold,
            anchor,
            verbose: self.opts.verbose,
            reference: &self.opts.reference,
            bam: &bam,
            fixed_fasta: staging.path(&self.files.fixed_fasta()),
            junctions_fasta: staging.path(&self.files.junctions_fasta()),
            fixed_sam: staging.path(&self.files.fixed_sam()),
            unaligned_fasta: staging.path(&self.files.unaligned_fasta()),
            filtered_fasta: staging.path(&self.files.filtered_fasta()),
        };
        vec![clean.build(&self.opts.tools.clean_alignments)]
    }
}

/// Merges the filtered alignments of every epoch into one coordinate sorted, indexed BAM.
pub struct MergeStage<'a> {
    pub opts: &'a Options,
    pub bams: &'a [PathBuf],
    pub merged: PathBuf,
}

impl Stage for MergeStage<'_> {
    fn name(&self) -> String {
        "merge".to_string()
    }

    fn inputs(&self) -> Vec<PathBuf> {
        self.bams.to_vec()
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.merged.clone(), bai_path(&self.merged)]
    }

    fn commands(&self, staging: &Staging) -> Vec<ToolCommand> {
        let samtools = &self.opts.tools.samtools;
        let bam = staging.path(&self.merged);
        let bai = staging.path(&bai_path(&self.merged));
        vec![
            samtools::merge(samtools, self.opts.threads, self.bams, &bam),
            samtools::index(samtools, &bam, &bai),
        ]
    }
}

#[cfg(test)]
pub mod tests {
    use super::{AlignStage, CleanStage, ConvertStage, MergeStage};
    use crate::pipeline::{
        layout::RunLayout,
        stage::{Stage, Staging},
        Options, PipelineBuilder,
    };
    use itertools::Itertools;
    use std::path::{Path, PathBuf};

    fn options(iterations: usize, verbose: bool) -> Options {
        PipelineBuilder::default()
            .indexes_dir("/idx")
            .index_name("hg38")
            .reference("ref.fa")
            .reads("reads.fa")
            .iterations(iterations)
            .threads(2)
            .verbose(verbose)
            .build_options()
            .unwrap()
    }

    fn command_lines(stage: &dyn Stage) -> Vec<String> {
        let staging = Staging::new(PathBuf::from("stg"));
        stage
            .commands(&staging)
            .iter()
            .map(crate::process::ToolCommand::command_line)
            .collect_vec()
    }

    #[test]
    fn test_align_stage() {
        let opts = options(3, false);
        let files = RunLayout::new("out", "reads").epoch(1);
        let stage = AlignStage {
            opts: &opts,
            reads: Path::new("reads.fa"),
            files: &files,
        };
        assert_eq!(stage.name(), "align-r1");
        assert_eq!(stage.inputs(), vec![PathBuf::from("reads.fa")]);
        assert_eq!(
            stage.outputs(),
            vec![PathBuf::from("out/reads_r1.sam"), PathBuf::from("out/reads_r1.log")]
        );
        assert_eq!(
            command_lines(&stage),
            vec![
                "gmap -D /idx -d hg38 --no-chimeras --cross-species --expand-offsets 1 -B 5 \
                 -K 8000 -f samse -n 1 -t 2 reads.fa > stg/reads_r1.sam 2> stg/reads_r1.log"
            ]
        );
    }

    #[test]
    fn test_convert_stage() {
        let opts = options(3, false);
        let stage = ConvertStage::new(
            "convert-r1".to_string(),
            &opts,
            PathBuf::from("out/reads_r1.sam"),
            PathBuf::from("out/reads_r1.bam"),
        );
        assert_eq!(
            stage.outputs(),
            vec![PathBuf::from("out/reads_r1.bam"), PathBuf::from("out/reads_r1.bam.bai")]
        );
        assert_eq!(
            command_lines(&stage),
            vec![
                "samtools sort -@ 2 -O bam -o stg/reads_r1.bam out/reads_r1.sam",
                "samtools index stg/reads_r1.bam stg/reads_r1.bam.bai",
            ]
        );
    }

    #[test]
    fn test_clean_stage_per_epoch_arguments() {
        let opts = options(3, true);
        let layout = RunLayout::new("out", "reads");

        let first = layout.epoch(1);
        let lines = command_lines(&CleanStage {
            opts: &opts,
            files: &first,
        });
        assert!(lines[0].contains(" -t 0 "), "{}", lines[0]);
        assert!(lines[0].ends_with("ref.fa out/reads_r1.bam -a 10 -v"), "{}", lines[0]);

        let middle = layout.epoch(2);
        let lines = command_lines(&CleanStage {
            opts: &opts,
            files: &middle,
        });
        assert!(lines[0].contains(" -t 0 "), "{}", lines[0]);
        assert!(lines[0].ends_with("ref.fa out/reads_r2.bam -v"), "{}", lines[0]);

        let last = layout.epoch(3);
        let stage = CleanStage {
            opts: &opts,
            files: &last,
        };
        let lines = command_lines(&stage);
        assert!(lines[0].contains(" -t 40 "), "{}", lines[0]);
        assert!(lines[0].contains("-f stg/reads_fixed_r3.fa"), "{}", lines[0]);
        assert_eq!(stage.outputs().len(), 5);
        assert!(stage.inputs().contains(&PathBuf::from("out/reads_r3.bam.bai")));
    }

    #[test]
    fn test_clean_stage_single_epoch_gets_both_first_and_final_arguments() {
        let opts = options(1, false);
        let files = RunLayout::new("out", "reads").epoch(1);
        let lines = command_lines(&CleanStage {
            opts: &opts,
            files: &files,
        });
        assert!(lines[0].contains(" -t 40 "), "{}", lines[0]);
        assert!(lines[0].ends_with(" -a 10"), "{}", lines[0]);
    }

    #[test]
    fn test_merge_stage() {
        let opts = options(2, false);
        let bams = vec![
            PathBuf::from("out/reads_filtered_r1.bam"),
            PathBuf::from("out/reads_filtered_r2.bam"),
        ];
        let stage = MergeStage {
            opts: &opts,
            bams: &bams,
            merged: PathBuf::from("out/reads.bam"),
        };
        assert_eq!(stage.inputs(), bams);
        assert_eq!(
            command_lines(&stage),
            vec![
                "samtools merge -f -@ 2 stg/reads.bam out/reads_filtered_r1.bam \
                 out/reads_filtered_r2.bam",
                "samtools index stg/reads.bam stg/reads.bam.bai",
            ]
        );
    }
}
