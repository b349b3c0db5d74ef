//! Chunk files stored on the file system.
//!
//! A chunk is a sorted run of records persisted as `<dir>/chunk_<index>`, one record per line.
//! Indices start at 0 and are contiguous, so the set of chunk files in a directory ends at the
//! first missing index.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::path::{Path, PathBuf};
use std::slice;

use crate::record::{self, Record, RecordReader};

/// Chunk file name prefix.
pub const CHUNK_FILE_PREFIX: &str = "chunk_";

/// Returns the path of the chunk file with the given index.
pub fn chunk_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{}{}", CHUNK_FILE_PREFIX, index))
}

/// Chunk file reader.
pub type ChunkReader = RecordReader<io::BufReader<fs::File>>;

/// Handle of a single chunk file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    index: usize,
    path: PathBuf,
}

impl ChunkFile {
    pub fn new(dir: &Path, index: usize) -> Self {
        ChunkFile {
            index,
            path: chunk_path(dir, index),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes already sorted items to the chunk file, truncating it if it exists.
    pub fn write<I>(dir: &Path, index: usize, items: I, buf_size: Option<usize>) -> io::Result<Self>
    where
        I: IntoIterator<Item = Record>,
    {
        let chunk = ChunkFile::new(dir, index);
        let file = fs::File::create(&chunk.path)?;

        let mut chunk_writer = match buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        for item in items.into_iter() {
            record::write_record(&mut chunk_writer, &item)?;
        }
        chunk_writer.flush()?;

        return Ok(chunk);
    }

    /// Opens the chunk file for reading.
    pub fn open(&self, buf_size: Option<usize>) -> io::Result<ChunkReader> {
        let file = fs::File::open(&self.path)?;
        let reader = match buf_size {
            Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
            None => io::BufReader::new(file),
        };

        return Ok(RecordReader::new(reader));
    }
}

/// Ordered list of chunk files produced by a single sort run.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    dir: PathBuf,
    chunks: Vec<ChunkFile>,
}

impl ChunkSet {
    pub fn new(dir: &Path) -> Self {
        ChunkSet {
            dir: dir.to_path_buf(),
            chunks: Vec::new(),
        }
    }

    /// Collects chunk files `chunk_0`, `chunk_1`, ... up to the first missing index.
    /// Chunk files beyond a gap are ignored.
    pub fn discover(dir: &Path) -> io::Result<Self> {
        let mut chunk_set = ChunkSet::new(dir);
        loop {
            let chunk = ChunkFile::new(dir, chunk_set.len());
            match fs::metadata(chunk.path()) {
                Ok(_) => chunk_set.chunks.push(chunk),
                Err(err) if err.kind() == io::ErrorKind::NotFound => break,
                Err(err) => return Err(err),
            }
        }

        log::debug!("discovered {} chunk(s) in {}", chunk_set.len(), dir.display());
        return Ok(chunk_set);
    }

    /// Appends a chunk. Chunks must be appended in index order.
    pub fn push(&mut self, chunk: ChunkFile) {
        debug_assert_eq!(chunk.index(), self.chunks.len());
        self.chunks.push(chunk);
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, ChunkFile> {
        self.chunks.iter()
    }
}

impl<'a> IntoIterator for &'a ChunkSet {
    type Item = &'a ChunkFile;
    type IntoIter = slice::Iter<'a, ChunkFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Removes chunk files `chunk_0`, `chunk_1`, ... up to the first missing index.
/// Returns the number of removed files. Files outside the contiguous range are left untouched.
pub fn clear_stale_chunks(dir: &Path) -> io::Result<usize> {
    let mut removed = 0;
    loop {
        match fs::remove_file(chunk_path(dir, removed)) {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => break,
            Err(err) => return Err(err),
        }
    }

    if removed > 0 {
        log::debug!("removed {} stale chunk(s) from {}", removed, dir.display());
    }
    return Ok(removed);
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io;
    use std::path::Path;

    use rstest::*;

    use super::{chunk_path, clear_stale_chunks, ChunkFile, ChunkSet};
    use crate::record::Record;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn records(items: &[&str]) -> Vec<Record> {
        items.iter().map(|item| item.as_bytes().to_vec()).collect()
    }

    fn touch_chunks(dir: &Path, indices: &[usize]) {
        for &index in indices {
            fs::write(chunk_path(dir, index), b"x\n").unwrap();
        }
    }

    #[test]
    fn test_chunk_path() {
        assert_eq!(chunk_path(Path::new("tmp"), 0), Path::new("tmp/chunk_0"));
        assert_eq!(chunk_path(Path::new("tmp"), 12), Path::new("tmp/chunk_12"));
    }

    #[rstest]
    fn test_chunk_write_and_read(tmp_dir: tempfile::TempDir) {
        let saved = records(&["apple", "", "cherry"]);

        let chunk = ChunkFile::write(tmp_dir.path(), 3, saved.clone(), Some(16)).unwrap();
        assert_eq!(chunk.index(), 3);
        assert_eq!(fs::read(chunk.path()).unwrap(), b"apple\n\ncherry\n");

        let restored: io::Result<Vec<Record>> = chunk.open(None).unwrap().collect();
        assert_eq!(restored.unwrap(), saved);
    }

    #[rstest]
    fn test_discover_stops_at_first_gap(tmp_dir: tempfile::TempDir) {
        touch_chunks(tmp_dir.path(), &[0, 1, 2, 4]);
        fs::write(tmp_dir.path().join("unrelated"), b"").unwrap();

        let chunk_set = ChunkSet::discover(tmp_dir.path()).unwrap();
        let indices: Vec<usize> = chunk_set.iter().map(ChunkFile::index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[rstest]
    fn test_discover_empty_dir(tmp_dir: tempfile::TempDir) {
        let chunk_set = ChunkSet::discover(tmp_dir.path()).unwrap();
        assert!(chunk_set.is_empty());
    }

    #[rstest]
    fn test_clear_stale_chunks(tmp_dir: tempfile::TempDir) {
        touch_chunks(tmp_dir.path(), &[0, 1, 2, 5]);
        fs::write(tmp_dir.path().join("unrelated"), b"").unwrap();

        assert_eq!(clear_stale_chunks(tmp_dir.path()).unwrap(), 3);
        assert!(!chunk_path(tmp_dir.path(), 0).exists());
        assert!(!chunk_path(tmp_dir.path(), 2).exists());
        assert!(chunk_path(tmp_dir.path(), 5).exists());
        assert!(tmp_dir.path().join("unrelated").exists());
    }

    #[rstest]
    fn test_clear_stale_chunks_is_idempotent(tmp_dir: tempfile::TempDir) {
        touch_chunks(tmp_dir.path(), &[0, 1]);

        assert_eq!(clear_stale_chunks(tmp_dir.path()).unwrap(), 2);
        assert_eq!(clear_stale_chunks(tmp_dir.path()).unwrap(), 0);
        assert!(ChunkSet::discover(tmp_dir.path()).unwrap().is_empty());
    }
}
