use crate::{
    process::{Redirect, Tool, ToolCommand},
    util::io::is_gzip_path,
};
use std::path::{Path, PathBuf};

/// Builds the gmap invocation that aligns one epoch's reads.
///
/// Reads are aligned without chimeras, in cross-species mode, with a single path per read
/// (`-n 1`) reported as single-end SAM (`-f samse`).  SAM is written to `sam` and gmap's
/// diagnostics to `log`.
#[derive(Clone, Debug)]
pub struct GmapCommand<'a> {
    pub indexes_dir: &'a Path,
    pub index_name: &'a str,
    pub max_intron: u32,
    pub threads: usize,
    pub reads: &'a Path,
    pub sam: PathBuf,
    pub log: PathBuf,
}

impl GmapCommand<'_> {
    pub fn build(&self, tool: &Tool) -> ToolCommand {
        let mut cmd = ToolCommand::new(tool)
            .arg("-D")
            .arg(self.indexes_dir)
            .arg("-d")
            .arg(self.index_name)
            .args(["--no-chimeras", "--cross-species", "--expand-offsets", "1", "-B", "5"])
            .arg("-K")
            .arg(self.max_intron.to_string())
            .args(["-f", "samse", "-n", "1"])
            .arg("-t")
            .arg(self.threads.to_string());
        if is_gzip_path(&self.reads) {
            cmd = cmd.arg("--gunzip");
        }
        cmd.arg(self.reads)
            .stdout(Redirect::File(self.sam.clone()))
            .stderr(Redirect::File(self.log.clone()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::GmapCommand;
    use crate::process::Tool;
    use std::path::Path;

    fn gmap(reads: &str) -> String {
        GmapCommand {
            indexes_dir: Path::new("/idx"),
            index_name: "hg38",
            max_intron: 8000,
            threads: 4,
            reads: Path::new(reads),
            sam: "out/reads_r1.sam".into(),
            log: "out/reads_r1.log".into(),
        }
        .build(&Tool::new("gmap"))
        .command_line()
    }

    #[test]
    fn test_gmap_command_line() {
        assert_eq!(
            gmap("reads.fa"),
            "gmap -D /idx -d hg38 --no-chimeras --cross-species --expand-offsets 1 -B 5 \
             -K 8000 -f samse -n 1 -t 4 reads.fa > out/reads_r1.sam 2> out/reads_r1.log"
        );
    }

    #[test]
    fn test_gmap_gunzips_compressed_reads() {
        assert!(gmap("reads.fa.gz").contains("-t 4 --gunzip reads.fa.gz >"));
    }
}
