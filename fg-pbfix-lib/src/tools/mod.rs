//! Command construction for the external tools the pipeline drives.
pub mod clean;
pub mod gmap;
pub mod samtools;

use crate::process::Tool;

/// The default executable for the gmap aligner.
pub const DEFAULT_GMAP: &str = "gmap";
/// The default executable for samtools.
pub const DEFAULT_SAMTOOLS: &str = "samtools";
/// The default executable for the alignment cleaning script.
pub const DEFAULT_CLEAN_ALIGNMENTS: &str = "cleanAlignments.py";

/// The set of external executables used by the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tools {
    pub gmap: Tool,
    pub samtools: Tool,
    pub clean_alignments: Tool,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            gmap: Tool::new(DEFAULT_GMAP),
            samtools: Tool::new(DEFAULT_SAMTOOLS),
            clean_alignments: Tool::new(DEFAULT_CLEAN_ALIGNMENTS),
        }
    }
}
