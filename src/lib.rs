//! `line-ext-sort` sorts newline-delimited text files that do not fit into memory.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Records:**
//!   every line of the input is a record, compared byte by byte (no locale or Unicode collation).
//! * **Chunks:**
//!   the input is split into runs of at most `chunk_size` records. Every run is sorted in memory and
//!   stored as `<tmp_dir>/chunk_<index>`, indices starting at 0 with no gaps.
//! * **Merge:**
//!   all chunk files are merged at once by a binary heap (or linear scan) k-way merger.
//!   Equal records are taken from the chunk with the lowest index first.
//! * **Chunk file lifecycle:**
//!   chunk files are kept after a run and removed by the next run before it writes new ones.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use env_logger;
//! use log;
//!
//! use line_ext_sort::ExternalSorterBuilder;
//!
//! fn main() {
//!     env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();
//!
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./temp"))
//!         .with_chunk_size(200_000)
//!         .build()
//!         .unwrap();
//!
//!     let report = sorter.sort(Path::new("input.txt"), Path::new("output.txt")).unwrap();
//!     println!("sorting time: {:?}", report.chunking.elapsed());
//!     println!("merging time: {:?}", report.merging.elapsed());
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod merger;
pub mod record;
pub mod sort;

pub use buffer::{LimitedBuffer, LimitedBufferBuilder};
pub use chunk::{ChunkFile, ChunkReader, ChunkSet};
pub use merger::{BinaryHeapMerger, LinearScanMerger};
pub use record::{Record, RecordReader};
pub use sort::{
    clear_stale_chunks, create_sorted_chunks, merge_sorted_chunks, BlankLines, ExternalSorter, ExternalSorterBuilder,
    MergeStrategy, PhaseTiming, SortError, SortReport,
};
