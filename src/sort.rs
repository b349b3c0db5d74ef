//! External sorter.

use log;
#[cfg(unix)]
use rlimit::{getrlimit, setrlimit, Resource};
#[cfg(unix)]
use std::cmp::min;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::chunk::{self, ChunkFile, ChunkReader, ChunkSet};
use crate::merger::{BinaryHeapMerger, LinearScanMerger};
use crate::record::{self, Record, RecordReader};
use crate::{LimitedBuffer, LimitedBufferBuilder};

/// Default number of records per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 200_000;

// descriptors kept free for the output file and the rest of the process
#[cfg(unix)]
const RESERVED_FILES: u64 = 256;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Chunk size is zero.
    InvalidChunkSize,
    /// Read/write buffer size is zero.
    InvalidBufferSize,
    /// Temporary directory access, creation or cleanup error.
    TempDir(io::Error),
    /// Input file opening or reading error.
    InputError(io::Error),
    /// Chunk file creation or writing error.
    ChunkWrite(io::Error),
    /// Chunk file opening or reading error.
    ChunkRead(io::Error),
    /// A chunk of the chunk set disappeared before it was merged.
    MissingChunk(PathBuf),
    /// Output file creation or writing error.
    OutputError(io::Error),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::InvalidChunkSize => None,
            SortError::InvalidBufferSize => None,
            SortError::TempDir(err) => Some(err),
            SortError::InputError(err) => Some(err),
            SortError::ChunkWrite(err) => Some(err),
            SortError::ChunkRead(err) => Some(err),
            SortError::MissingChunk(_) => None,
            SortError::OutputError(err) => Some(err),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidChunkSize => write!(f, "chunk size must be greater than zero"),
            SortError::InvalidBufferSize => write!(f, "read/write buffer size must be greater than zero"),
            SortError::TempDir(err) => write!(f, "temporary directory not accessible: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::ChunkWrite(err) => write!(f, "chunk file not written: {}", err),
            SortError::ChunkRead(err) => write!(f, "chunk file not read: {}", err),
            SortError::MissingChunk(path) => write!(f, "chunk file {} is missing", path.display()),
            SortError::OutputError(err) => write!(f, "output data stream error: {}", err),
        }
    }
}

/// Policy for zero-length records.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlankLines {
    /// A blank line read while the chunk buffer is still empty means "no data for this read" and
    /// is dropped. Blank lines inside a chunk are kept as zero-length records.
    DropLeading,
    /// Every blank line is kept as a zero-length record.
    Keep,
}

impl Default for BlankLines {
    fn default() -> Self {
        BlankLines::DropLeading
    }
}

/// K-way merge implementation used to combine chunks.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Min-heap selection, *m* \* log(*n*).
    BinaryHeap,
    /// Linear scan over all chunks, *m* \* *n*.
    LinearScan,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::BinaryHeap
    }
}

/// Start and end instants of a sorting phase.
#[derive(Copy, Clone, Debug)]
pub struct PhaseTiming {
    pub started: Instant,
    pub finished: Instant,
}

impl PhaseTiming {
    fn measure<T, F>(phase: F) -> (T, PhaseTiming)
    where
        F: FnOnce() -> T,
    {
        let started = Instant::now();
        let result = phase();
        let finished = Instant::now();
        (result, PhaseTiming { started, finished })
    }

    pub fn elapsed(&self) -> Duration {
        self.finished.duration_since(self.started)
    }
}

/// Summary of a complete sort run.
#[derive(Clone, Debug)]
pub struct SortReport {
    /// Number of chunk files produced.
    pub chunks: usize,
    /// Number of records written to the output.
    pub records: u64,
    /// Chunk producing phase.
    pub chunking: PhaseTiming,
    /// Chunk merging phase.
    pub merging: PhaseTiming,
}

impl SortReport {
    pub fn elapsed(&self) -> Duration {
        self.merging.finished.duration_since(self.chunking.started)
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Default)]
pub struct ExternalSorterBuilder {
    /// Maximum number of records in a chunk.
    chunk_size: Option<usize>,
    /// Directory to be used to store chunk files.
    tmp_dir: Option<PathBuf>,
    /// Input, chunk and output read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Blank line policy.
    blank_lines: BlankLines,
    /// Chunk merger.
    merge_strategy: MergeStrategy,
    /// Preallocate chunk buffers.
    preallocate: bool,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(
            self.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.blank_lines,
            self.merge_strategy,
            self.preallocate,
        )
    }

    /// Sets maximum number of records in a chunk.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> ExternalSorterBuilder {
        self.chunk_size = Some(chunk_size);
        return self;
    }

    /// Sets directory to be used to store chunk files. The directory must exist.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets read/write buffer size. Must be greater than zero.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets blank line policy.
    pub fn with_blank_lines(mut self, blank_lines: BlankLines) -> ExternalSorterBuilder {
        self.blank_lines = blank_lines;
        return self;
    }

    /// Sets chunk merger.
    pub fn with_merge_strategy(mut self, merge_strategy: MergeStrategy) -> ExternalSorterBuilder {
        self.merge_strategy = merge_strategy;
        return self;
    }

    /// Allocates the whole chunk buffer up front.
    pub fn with_preallocation(mut self, preallocate: bool) -> ExternalSorterBuilder {
        self.preallocate = preallocate;
        return self;
    }
}

enum ChunkDir {
    /// Created by the sorter, removed together with it.
    Owned(tempfile::TempDir),
    /// Provided by the caller, chunk files are left in place.
    Provided(PathBuf),
}

impl ChunkDir {
    fn path(&self) -> &Path {
        match self {
            ChunkDir::Owned(dir) => dir.path(),
            ChunkDir::Provided(path) => path,
        }
    }
}

/// External sorter.
pub struct ExternalSorter {
    /// Directory to be used to store chunk files.
    tmp_dir: ChunkDir,
    /// Chunk buffer builder.
    buffer_builder: LimitedBufferBuilder,
    /// Input, chunk and output read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Blank line policy.
    blank_lines: BlankLines,
    /// Chunk merger.
    merge_strategy: MergeStrategy,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `chunk_size` - Maximum number of records sorted in memory at once.
    /// * `tmp_path` - Directory to be used to store chunk files. If the parameter is [`None`] a new
    ///   directory is created in the OS temporary directory and removed when the sorter is dropped.
    /// * `rw_buf_size` - Input, chunk and output read/write buffer size.
    /// * `blank_lines` - Blank line policy.
    /// * `merge_strategy` - Chunk merger.
    /// * `preallocate` - Allocate chunk buffers up front.
    pub fn new(
        chunk_size: usize,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        blank_lines: BlankLines,
        merge_strategy: MergeStrategy,
        preallocate: bool,
    ) -> Result<Self, SortError> {
        if chunk_size == 0 {
            return Err(SortError::InvalidChunkSize);
        }
        // a zero capacity reader never fills and reports end of input on the first read
        if rw_buf_size == Some(0) {
            return Err(SortError::InvalidBufferSize);
        }
        log::info!("initializing sorter (chunk size: {} records)", chunk_size);

        return Ok(ExternalSorter {
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            buffer_builder: LimitedBufferBuilder::new(chunk_size, preallocate),
            rw_buf_size,
            blank_lines,
            merge_strategy,
        });
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<ChunkDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            let metadata = fs::metadata(tmp_path).map_err(SortError::TempDir)?;
            if !metadata.is_dir() {
                return Err(SortError::TempDir(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{} is not a directory", tmp_path.display()),
                )));
            }
            ChunkDir::Provided(tmp_path.to_path_buf())
        } else {
            ChunkDir::Owned(tempfile::tempdir().map_err(SortError::TempDir)?)
        };

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Returns the directory chunk files are stored in.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Returns the maximum number of records in a chunk.
    pub fn chunk_size(&self) -> usize {
        self.buffer_builder.limit()
    }

    /// Sorts the input file into the output file.
    ///
    /// Stale chunk files are cleared first, then the input is split into sorted chunks which are
    /// merged into the output. Chunk files are left in the temporary directory.
    pub fn sort(&self, input: &Path, output: &Path) -> Result<SortReport, SortError> {
        self.clear_stale_chunks()?;

        let (chunks, chunking) = PhaseTiming::measure(|| self.create_sorted_chunks(input));
        let chunks = chunks?;
        log::debug!("chunking done in {:?}", chunking.elapsed());

        let (records, merging) = PhaseTiming::measure(|| self.merge_sorted_chunks(&chunks, output));
        let records = records?;
        log::debug!("merging done in {:?}", merging.elapsed());

        return Ok(SortReport {
            chunks: chunks.len(),
            records,
            chunking,
            merging,
        });
    }

    /// Removes chunk files left by a previous run.
    /// Returns the number of removed files.
    pub fn clear_stale_chunks(&self) -> Result<usize, SortError> {
        chunk::clear_stale_chunks(self.tmp_dir()).map_err(SortError::TempDir)
    }

    /// Splits the input into sorted chunk files.
    /// Returns the chunk files in index order.
    ///
    /// # Arguments
    /// * `input` - Newline-delimited file to be split
    pub fn create_sorted_chunks(&self, input: &Path) -> Result<ChunkSet, SortError> {
        let input_file = fs::File::open(input).map_err(SortError::InputError)?;
        let input_reader = match self.rw_buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, input_file),
            None => io::BufReader::new(input_file),
        };

        let mut chunk_buf = self.buffer_builder.build();
        let mut chunks = ChunkSet::new(self.tmp_dir());

        for item in RecordReader::new(input_reader) {
            let item = item.map_err(SortError::InputError)?;

            if item.is_empty() && chunk_buf.is_empty() && self.blank_lines == BlankLines::DropLeading {
                log::trace!("dropping blank line at chunk {} start", chunks.len());
                continue;
            }
            chunk_buf.push(item);

            if chunk_buf.is_full() {
                chunks.push(self.create_chunk(chunk_buf, chunks.len())?);
                chunk_buf = self.buffer_builder.build();
            }
        }

        if !chunk_buf.is_empty() {
            chunks.push(self.create_chunk(chunk_buf, chunks.len())?);
        }

        log::debug!("external sort preparation done ({} chunks)", chunks.len());

        return Ok(chunks);
    }

    fn create_chunk(&self, mut buffer: LimitedBuffer<Record>, index: usize) -> Result<ChunkFile, SortError> {
        log::debug!("sorting chunk {} ({} records) ...", index, buffer.len());
        buffer.sort();

        log::debug!("saving chunk {}", index);
        ChunkFile::write(self.tmp_dir(), index, buffer, self.rw_buf_size).map_err(SortError::ChunkWrite)
    }

    /// Merges sorted chunk files into the output file.
    /// Returns the number of records written.
    ///
    /// # Arguments
    /// * `chunks` - Chunk files to be merged
    /// * `output` - File to be created or truncated
    pub fn merge_sorted_chunks(&self, chunks: &ChunkSet, output: &Path) -> Result<u64, SortError> {
        let previous_limit = raise_open_files_limit(chunks.len());
        let result = self.merge_chunks(chunks, output);
        restore_open_files_limit(previous_limit);

        return result;
    }

    fn merge_chunks(&self, chunks: &ChunkSet, output: &Path) -> Result<u64, SortError> {
        let readers = self.open_chunks(chunks)?;

        let output_file = fs::File::create(output).map_err(SortError::OutputError)?;
        let mut output_writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, output_file),
            None => io::BufWriter::new(output_file),
        };

        log::debug!("merging {} chunks using {:?}", readers.len(), self.merge_strategy);
        let records = match self.merge_strategy {
            MergeStrategy::BinaryHeap => write_merged(BinaryHeapMerger::new(readers), &mut output_writer)?,
            MergeStrategy::LinearScan => write_merged(LinearScanMerger::new(readers), &mut output_writer)?,
        };
        output_writer.flush().map_err(SortError::OutputError)?;

        return Ok(records);
    }

    fn open_chunks(&self, chunks: &ChunkSet) -> Result<Vec<ChunkReader>, SortError> {
        chunks
            .iter()
            .map(|chunk| {
                chunk.open(self.rw_buf_size).map_err(|err| match err.kind() {
                    io::ErrorKind::NotFound => SortError::MissingChunk(chunk.path().to_path_buf()),
                    _ => SortError::ChunkRead(err),
                })
            })
            .collect()
    }
}

/// Raises the soft limit of open file descriptors so that all chunks can be merged at once.
/// Returns the previous `(soft, hard)` limits if they were changed.
#[cfg(unix)]
fn raise_open_files_limit(chunks: usize) -> Option<(u64, u64)> {
    let (current_soft, current_hard) = match getrlimit(Resource::NOFILE) {
        Ok(limits) => limits,
        Err(err) => {
            log::warn!("getrlimit NOFILE failed: {}", err);
            return None;
        }
    };
    let required = (chunks as u64).saturating_add(RESERVED_FILES);
    let new_soft = min(required, current_hard);
    if new_soft <= current_soft {
        return None;
    }

    log::info!("set rlimit NOFILE, soft: {} -> {}, hard: {}", current_soft, new_soft, current_hard);
    match setrlimit(Resource::NOFILE, new_soft, current_hard) {
        Ok(()) => Some((current_soft, current_hard)),
        Err(err) => {
            log::warn!("setrlimit NOFILE failed: {}", err);
            None
        }
    }
}

/// Restores limits saved by [`raise_open_files_limit`].
#[cfg(unix)]
fn restore_open_files_limit(previous: Option<(u64, u64)>) {
    if let Some((soft, hard)) = previous {
        log::info!("restore rlimit NOFILE, soft: {}, hard: {}", soft, hard);
        if let Err(err) = setrlimit(Resource::NOFILE, soft, hard) {
            log::warn!("setrlimit NOFILE failed: {}", err);
        }
    }
}

#[cfg(not(unix))]
fn raise_open_files_limit(_chunks: usize) -> Option<(u64, u64)> {
    None
}

#[cfg(not(unix))]
fn restore_open_files_limit(_previous: Option<(u64, u64)>) {}

fn write_merged<M, W>(merged: M, writer: &mut W) -> Result<u64, SortError>
where
    M: Iterator<Item = io::Result<Record>>,
    W: Write,
{
    let mut records = 0;
    for item in merged {
        let item = item.map_err(SortError::ChunkRead)?;
        record::write_record(writer, &item).map_err(SortError::OutputError)?;
        records += 1;
    }

    return Ok(records);
}

/// Splits `input` into sorted chunk files of at most `chunk_size` records stored in `tmp_dir`.
/// Stale chunk files are not cleared, see [`clear_stale_chunks`].
pub fn create_sorted_chunks(input: &Path, tmp_dir: &Path, chunk_size: usize) -> Result<ChunkSet, SortError> {
    ExternalSorterBuilder::new()
        .with_tmp_dir(tmp_dir)
        .with_chunk_size(chunk_size)
        .build()?
        .create_sorted_chunks(input)
}

/// Merges the chunk files found in `tmp_dir` into `output`.
/// Chunk files are discovered from `chunk_0` up to the first missing index.
/// Returns the number of records written.
pub fn merge_sorted_chunks(tmp_dir: &Path, output: &Path) -> Result<u64, SortError> {
    let sorter = ExternalSorterBuilder::new().with_tmp_dir(tmp_dir).build()?;
    let chunks = ChunkSet::discover(tmp_dir).map_err(SortError::TempDir)?;

    sorter.merge_sorted_chunks(&chunks, output)
}

/// Removes chunk files `chunk_0`, `chunk_1`, ... from `tmp_dir` up to the first missing index.
pub fn clear_stale_chunks(tmp_dir: &Path) -> Result<usize, SortError> {
    chunk::clear_stale_chunks(tmp_dir).map_err(SortError::TempDir)
}
