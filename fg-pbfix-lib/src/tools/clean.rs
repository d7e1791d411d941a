use crate::process::{Tool, ToolCommand};
use std::path::{Path, PathBuf};

/// Builds the `cleanAlignments.py` invocation for one epoch.
///
/// The script reads the epoch's sorted alignments and the reference, corrects indels and
/// mismatches, drops alignments whose edit distance exceeds `edit_distance_ratio` of the
/// aligned length, and writes:
/// - `fixed_fasta`: corrected reads, the input to the next epoch
/// - `junctions_fasta`: splice junction sequences
/// - `fixed_sam`: the alignments that were kept
/// - `unaligned_fasta`: reads that did not align
/// - `filtered_fasta`: reads removed by the edit distance filter
#[derive(Clone, Debug)]
pub struct CleanCommand<'a> {
    pub edit_distance_ratio: f64,
    /// Passed as `-t`.
    pub threshold: u32,
    /// Passed as `-a` when set.
    pub anchor: Option<u32>,
    pub verbose: bool,
    pub reference: &'a Path,
    pub bam: &'a Path,
    pub fixed_fasta: PathBuf,
    pub junctions_fasta: PathBuf,
    pub fixed_sam: PathBuf,
    pub unaligned_fasta: PathBuf,
    pub filtered_fasta: PathBuf,
}

impl CleanCommand<'_> {
    pub fn build(&self, tool: &Tool) -> ToolCommand {
        let mut cmd = ToolCommand::new(tool)
            .arg("-e")
            .arg(format!("{:.6}", self.edit_distance_ratio))
            .arg("-t")
            .arg(self.threshold.to_string())
            .arg("-f")
            .arg(&self.fixed_fasta)
            .arg("-j")
            .arg(&self.junctions_fasta)
            .arg("-s")
            .arg(&self.fixed_sam)
            .arg("-u")
            .arg(&self.unaligned_fasta)
            .arg("-r")
            .arg(&self.filtered_fasta)
            .arg(self.reference)
            .arg(self.bam);
        if let Some(anchor) = self.anchor {
            cmd = cmd.arg("-a").arg(anchor.to_string());
        }
        if self.verbose {
            cmd = cmd.arg("-v");
        }
        cmd
    }
}

#[cfg(test)]
pub mod tests {
    use super::CleanCommand;
    use crate::process::Tool;
    use rstest::rstest;
    use std::path::Path;

    #[rstest]
    #[case(0, None, false, "")]
    #[case(40, Some(10), false, " -a 10")]
    #[case(0, Some(10), true, " -a 10 -v")]
    #[case(40, None, true, " -v")]
    fn test_clean_command_line(
        #[case] threshold: u32,
        #[case] anchor: Option<u32>,
        #[case] verbose: bool,
        #[case] suffix: &str,
    ) {
        let cmd = CleanCommand {
            edit_distance_ratio: 0.1,
            threshold,
            anchor,
            verbose,
            reference: Path::new("ref.fa"),
            bam: Path::new("o/r_r1.bam"),
            fixed_fasta: "o/r_fixed_r1.fa".into(),
            junctions_fasta: "o/r_junctions_r1.fa".into(),
            fixed_sam: "o/r_fixed_r1.sam".into(),
            unaligned_fasta: "o/r_unaligned_r1.fa".into(),
            filtered_fasta: "o/r_filtered_r1.fa".into(),
        }
        .build(&Tool::new("cleanAlignments.py"));
        let expected = format!(
            "cleanAlignments.py -e 0.100000 -t {threshold} -f o/r_fixed_r1.fa \
             -j o/r_junctions_r1.fa -s o/r_fixed_r1.sam -u o/r_unaligned_r1.fa \
             -r o/r_filtered_r1.fa ref.fa o/r_r1.bam{suffix}"
        );
        assert_eq!(cmd.command_line(), expected);
    }
}
