//! Names of the files written into the output directory.
use derive_getters::Getters;
use std::path::{Path, PathBuf};

/// The name of the directory, inside the output directory, holding the pipeline's own state:
/// staged outputs and the commands each stage last ran with.
pub const STATE_DIR_NAME: &str = ".pbfix";

/// Returns the path of the BAI index for the given BAM.
pub fn bai_path(bam: &Path) -> PathBuf {
    let mut name = bam.as_os_str().to_os_string();
    name.push(".bai");
    PathBuf::from(name)
}

/// The files of a whole run.  Every file name starts with the base name of the input reads.
#[derive(Clone, Debug, Getters)]
pub struct RunLayout {
    dir: PathBuf,
    base: String,
}

impl RunLayout {
    pub fn new<P: AsRef<Path>>(dir: P, base: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            base: base.to_string(),
        }
    }

    /// The files of the given (1-based) epoch.
    pub fn epoch(&self, epoch: usize) -> EpochLayout {
        EpochLayout {
            epoch,
            dir: self.dir.clone(),
            base: self.base.clone(),
        }
    }

    /// The coordinate sorted merge of every epoch's filtered alignments.
    pub fn merged_bam(&self) -> PathBuf {
        self.dir.join(format!("{}.bam", self.base))
    }

    pub fn metrics(&self) -> PathBuf {
        self.dir.join(format!("{}.epochs.tsv", self.base))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.dir.join(STATE_DIR_NAME)
    }
}

/// The files of a single epoch.
#[derive(Clone, Debug, Getters)]
pub struct EpochLayout {
    epoch: usize,
    dir: PathBuf,
    base: String,
}

impl EpochLayout {
    fn file(&self, infix: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{}{infix}_r{}.{ext}", self.base, self.epoch))
    }

    /// gmap's SAM output.
    pub fn raw_sam(&self) -> PathBuf {
        self.file("", "sam")
    }

    /// gmap's standard error.
    pub fn gmap_log(&self) -> PathBuf {
        self.file("", "log")
    }

    /// gmap's alignments, coordinate sorted.
    pub fn raw_bam(&self) -> PathBuf {
        self.file("", "bam")
    }

    /// Corrected reads; the input of the next epoch.
    pub fn fixed_fasta(&self) -> PathBuf {
        self.file("_fixed", "fa")
    }

    pub fn junctions_fasta(&self) -> PathBuf {
        self.file("_junctions", "fa")
    }

    /// Alignments kept by the cleaning step.
    pub fn fixed_sam(&self) -> PathBuf {
        self.file("_fixed", "sam")
    }

    pub fn unaligned_fasta(&self) -> PathBuf {
        self.file("_unaligned", "fa")
    }

    pub fn filtered_fasta(&self) -> PathBuf {
        self.file("_filtered", "fa")
    }

    /// The alignments kept by the cleaning step, coordinate sorted.
    pub fn filtered_bam(&self) -> PathBuf {
        self.file("_filtered", "bam")
    }
}
