//! Chunk file streaming reader and writer.
//!
//! A chunk is a temporary file holding a sorted run of records. Chunks are
//! consumed at most once: a [`ChunkReader`] removes its backing file when it
//! is dropped, on every exit path, so intermediate storage is reclaimed
//! without a separate cleanup pass.

use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::record::{read_block, Record};
use crate::sort::SortError;

/// Allocator for generated chunk file names (`<prefix>NNNN`, zero-padded
/// monotonic counter). Each phase owns its own allocator instance.
pub struct ChunkNamer {
    dir: PathBuf,
    prefix: &'static str,
    counter: usize,
}

impl ChunkNamer {
    pub fn new(dir: &Path, prefix: &'static str) -> Self {
        ChunkNamer {
            dir: dir.to_owned(),
            prefix,
            counter: 0,
        }
    }

    /// Returns the next generated chunk path.
    pub fn next_name(&mut self) -> PathBuf {
        let name = format!("{}{:04}", self.prefix, self.counter);
        self.counter += 1;
        self.dir.join(name)
    }
}

/// Streaming chunk reader. Pulls fixed-size blocks of records from its
/// backing file into an internal buffer of `capacity` records.
pub struct ChunkReader<T: Record> {
    path: PathBuf,
    file: fs::File,
    buf: Vec<T>,
    pos: usize,
    len: usize,
    depleted: bool,
}

impl<T: Record> ChunkReader<T> {
    pub fn open(path: PathBuf, capacity: usize) -> Result<Self, SortError> {
        let file = fs::File::open(&path).map_err(|err| SortError::Open {
            path: path.clone(),
            source: err,
        })?;

        Ok(ChunkReader {
            file,
            buf: vec![T::zeroed(); capacity],
            pos: 0,
            len: 0,
            depleted: false,
            path,
        })
    }

    /// Discards any unconsumed records and loads the next block.
    /// No-op once the source is depleted.
    pub fn read_next(&mut self) -> Result<(), SortError> {
        self.pos = 0;
        self.len = 0;

        if self.depleted {
            return Ok(());
        }

        let (read, eof) = read_block(&mut self.file, &mut self.buf, &self.path)?;
        self.len = read;
        if eof {
            self.depleted = true;
        }

        Ok(())
    }

    /// The first unconsumed record of the current block, if any.
    pub fn head(&self) -> Option<&T> {
        self.pending().first()
    }

    /// Consumes the head record of the current block.
    pub fn advance(&mut self) {
        debug_assert!(self.pos < self.len);
        self.pos += 1;
    }

    /// The unconsumed records of the current block.
    pub fn pending(&self) -> &[T] {
        &self.buf[self.pos..self.len]
    }

    /// Marks the whole current block as consumed.
    pub fn consume_all(&mut self) {
        self.pos = self.len;
    }

    pub fn is_empty(&self) -> bool {
        self.pos == self.len
    }

    /// Whether the underlying file has no further records to offer. The
    /// flag only ever goes from `false` to `true`; once set, the records
    /// still pending in the buffer are all that remain.
    pub fn depleted(&self) -> bool {
        self.depleted
    }
}

impl<T: Record> Drop for ChunkReader<T> {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            log::warn!("chunk file {} not removed: {}", self.path.display(), err);
        }
    }
}

/// Streaming chunk writer. Buffers up to `capacity` records and flushes
/// full buffers to its backing file.
pub struct ChunkWriter<T: Record> {
    path: PathBuf,
    file: fs::File,
    buf: Vec<T>,
    capacity: usize,
}

impl<T: Record> ChunkWriter<T> {
    pub fn create(path: PathBuf, capacity: usize) -> Result<Self, SortError> {
        let file = fs::File::create(&path).map_err(|err| SortError::Open {
            path: path.clone(),
            source: err,
        })?;

        Ok(ChunkWriter {
            file,
            buf: Vec::with_capacity(capacity),
            capacity,
            path,
        })
    }

    /// Appends one record, flushing when the buffer fills up.
    pub fn store(&mut self, record: T) -> Result<(), SortError> {
        self.buf.push(record);
        if self.buf.len() == self.capacity {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes a whole block directly to the file, bypassing the record
    /// buffer. Pending records are flushed first so output order is kept.
    pub fn store_block(&mut self, records: &[T]) -> Result<(), SortError> {
        self.flush()?;
        self.write_records(records)
    }

    /// Flushes pending records and consumes the writer.
    pub fn finish(mut self) -> Result<(), SortError> {
        self.flush()
    }

    fn flush(&mut self) -> Result<(), SortError> {
        if !self.buf.is_empty() {
            let pending = std::mem::take(&mut self.buf);
            self.write_records(&pending)?;
            self.buf = pending;
            self.buf.clear();
        }
        Ok(())
    }

    fn write_records(&mut self, records: &[T]) -> Result<(), SortError> {
        self.file
            .write_all(bytemuck::cast_slice(records))
            .map_err(|err| SortError::Io {
                path: self.path.clone(),
                source: err,
            })
    }
}

impl<T: Record> Drop for ChunkWriter<T> {
    fn drop(&mut self) {
        if !self.buf.is_empty() {
            if let Err(err) = self.flush() {
                log::warn!("chunk file {} not flushed: {}", self.path.display(), err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use rstest::*;

    use super::{ChunkNamer, ChunkReader, ChunkWriter};
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn read_file(path: &Path) -> Vec<u32> {
        bytemuck::pod_collect_to_vec(&fs::read(path).unwrap())
    }

    #[rstest]
    fn test_namer() {
        let mut namer = ChunkNamer::new(Path::new("work"), "tmp_split_file_");

        assert_eq!(namer.next_name(), Path::new("work").join("tmp_split_file_0000"));
        assert_eq!(namer.next_name(), Path::new("work").join("tmp_split_file_0001"));
    }

    #[rstest]
    fn test_writer_reader_round_trip(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("chunk");

        let mut writer = ChunkWriter::create(path.clone(), 3).unwrap();
        for value in [5u32, 1, 4, 2, 3] {
            writer.store(value).unwrap();
        }
        writer.finish().unwrap();

        let mut reader: ChunkReader<u32> = ChunkReader::open(path.clone(), 2).unwrap();
        let mut restored = Vec::new();
        loop {
            reader.read_next().unwrap();
            restored.extend_from_slice(reader.pending());
            reader.consume_all();
            if reader.depleted() {
                break;
            }
        }

        assert_eq!(restored, vec![5, 1, 4, 2, 3]);

        drop(reader);
        assert!(!path.exists(), "reader must remove its backing file");
    }

    #[rstest]
    fn test_reader_removes_file_when_not_drained(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("chunk");
        fs::write(&path, bytemuck::cast_slice(&[1u32, 2, 3, 4])).unwrap();

        let mut reader: ChunkReader<u32> = ChunkReader::open(path.clone(), 2).unwrap();
        reader.read_next().unwrap();
        drop(reader);

        assert!(!path.exists());
    }

    #[rstest]
    fn test_reader_rejects_partial_record(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("chunk");
        fs::write(&path, [0u8; 10]).unwrap();

        let mut reader: ChunkReader<u32> = ChunkReader::open(path.clone(), 4).unwrap();
        let err = reader.read_next().unwrap_err();

        assert!(matches!(err, SortError::Corrupted { .. }));
    }

    #[rstest]
    fn test_store_block_flushes_pending_records_first(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("chunk");

        let mut writer = ChunkWriter::create(path.clone(), 4).unwrap();
        writer.store(7u32).unwrap();
        writer.store_block(&[8, 9]).unwrap();
        writer.finish().unwrap();

        assert_eq!(read_file(&path), vec![7, 8, 9]);
    }

    #[rstest]
    fn test_writer_flushes_remainder_on_drop(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("chunk");

        let mut writer = ChunkWriter::create(path.clone(), 8).unwrap();
        writer.store(1u32).unwrap();
        writer.store(2u32).unwrap();
        drop(writer);

        assert_eq!(read_file(&path), vec![1, 2]);
    }
}
