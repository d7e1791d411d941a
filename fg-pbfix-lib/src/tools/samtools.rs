use crate::process::{Tool, ToolCommand};
use std::path::Path;

/// `samtools sort`: coordinate sorts a SAM/BAM into a BAM.
pub fn sort(tool: &Tool, threads: usize, input: &Path, output: &Path) -> ToolCommand {
    ToolCommand::new(tool)
        .arg("sort")
        .arg("-@")
        .arg(threads.to_string())
        .args(["-O", "bam"])
        .arg("-o")
        .arg(output)
        .arg(input)
}

/// `samtools index`: writes the BAI for a coordinate sorted BAM to an explicit path.
pub fn index(tool: &Tool, bam: &Path, bai: &Path) -> ToolCommand {
    ToolCommand::new(tool).arg("index").arg(bam).arg(bai)
}

/// `samtools merge`: merges coordinate sorted BAMs, overwriting any existing output.
pub fn merge<P: AsRef<Path>>(
    tool: &Tool,
    threads: usize,
    inputs: &[P],
    output: &Path,
) -> ToolCommand {
    ToolCommand::new(tool)
        .args(["merge", "-f", "-@"])
        .arg(threads.to_string())
        .arg(output)
        .args(inputs.iter().map(|p| p.as_ref().as_os_str()))
}

#[cfg(test)]
pub mod tests {
    use super::{index, merge, sort};
    use crate::process::Tool;
    use std::path::Path;

    #[test]
    fn test_sort() {
        let cmd = sort(&Tool::new("samtools"), 2, Path::new("a.sam"), Path::new("a.bam"));
        assert_eq!(cmd.command_line(), "samtools sort -@ 2 -O bam -o a.bam a.sam");
    }

    #[test]
    fn test_index() {
        let cmd = index(&Tool::new("samtools"), Path::new("a.bam"), Path::new("tmp/a.bam.bai"));
        assert_eq!(cmd.command_line(), "samtools index a.bam tmp/a.bam.bai");
    }

    #[test]
    fn test_merge() {
        let inputs = [Path::new("r1.bam"), Path::new("r2.bam")];
        let cmd = merge(&Tool::new("samtools"), 1, &inputs, Path::new("all.bam"));
        assert_eq!(cmd.command_line(), "samtools merge -f -@ 1 all.bam r1.bam r2.bam");
    }
}
