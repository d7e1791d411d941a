use anyhow::{bail, Context, Result};
use fgoxide::io::Io;
use proglog::{CountFormatterKind, ProgLogBuilder};
use seq_io::{fasta::Reader as FastaReader, fastq::Reader as FastqReader};
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

/// 128 KB default buffer size, same as pigz.
pub const BUFFER_SIZE: usize = 64 * (1 << 10) * 2;

/// Returns true if the path ends with one of the given file extensions
fn is_path_with_extension<P: AsRef<Path>>(p: &P, extensions: &[&str]) -> bool {
    if let Some(ext) = p.as_ref().extension() {
        match ext.to_str() {
            Some(x) => extensions.contains(&x),
            None => false,
        }
    } else {
        false
    }
}

/// The set of file extensions to treat as GZIPPED
const GZIP_EXTENSIONS: [&str; 2] = ["gz", "bgz"];

/// Returns true if the path ends with a recognized GZIP file extension
pub fn is_gzip_path<P: AsRef<Path>>(p: &P) -> bool {
    is_path_with_extension(p, &GZIP_EXTENSIONS)
}

/// The base name used to prefix all output files: the file name up to the first `.`.
///
/// For example `/data/movie1.subreads.fasta.gz` yields `movie1`.
pub fn base_name<P: AsRef<Path>>(p: &P) -> Result<String> {
    let path = p.as_ref();
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Cannot determine a file name for: {}", path.display()))?;
    let base = file_name.split('.').next().unwrap_or_default();
    if base.is_empty() {
        bail!("Cannot derive an output prefix from file name: {file_name}");
    }
    Ok(base.to_string())
}

/// The formats read counting understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadFormat {
    Fasta,
    Fastq,
}

/// Skips leading whitespace and returns the format named by the next byte, or `None` when
/// nothing but whitespace remains.
fn sniff_format<R: BufRead>(reader: &mut R) -> Result<Option<ReadFormat>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        if let Some(pos) = buf.iter().position(|b| !b.is_ascii_whitespace()) {
            let first = buf[pos];
            reader.consume(pos);
            return match first {
                b'>' => Ok(Some(ReadFormat::Fasta)),
                b'@' => Ok(Some(ReadFormat::Fastq)),
                other => bail!("Expected FASTA ('>') or FASTQ ('@'), found '{}'", other as char),
            };
        }
        let len = buf.len();
        reader.consume(len);
    }
}

/// Counts the records in a FASTA or FASTQ file, which may be GZIP compressed.  The format is
/// taken from the first non-blank byte of the (decompressed) content.
pub fn count_reads(path: &PathBuf) -> Result<u64> {
    let fg_io: Io = Io::new(5, BUFFER_SIZE);
    let mut source: Box<dyn BufRead + Send> = fg_io
        .new_reader(path)
        .with_context(|| format!("Error opening reads: {}", path.display()))?;
    let format = match sniff_format(&mut source)
        .with_context(|| format!("Error reading: {}", path.display()))?
    {
        Some(format) => format,
        None => return Ok(0),
    };
    let progress_logger = ProgLogBuilder::new()
        .name("pbfix-count")
        .noun("reads")
        .verb("Counted")
        .unit(1_000_000)
        .count_formatter(CountFormatterKind::Comma)
        .build();

    let mut count: u64 = 0;
    match format {
        ReadFormat::Fastq => {
            let mut reader = FastqReader::with_capacity(source, BUFFER_SIZE);
            while let Some(record) = reader.next() {
                record.with_context(|| format!("Error reading FASTQ: {}", path.display()))?;
                progress_logger.record();
                count += 1;
            }
        }
        ReadFormat::Fasta => {
            let mut reader = FastaReader::with_capacity(source, BUFFER_SIZE);
            while let Some(record) = reader.next() {
                record.with_context(|| format!("Error reading FASTA: {}", path.display()))?;
                progress_logger.record();
                count += 1;
            }
        }
    }
    Ok(count)
}
