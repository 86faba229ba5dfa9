//! External sorter façade.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkNamer;
use crate::merge;
use crate::record::Record;
use crate::split;

/// Minimal number of records the memory limit must accommodate; below this
/// neither the split nor the merge buffers can make progress.
pub const MIN_MEM_RECORDS: usize = 8;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Memory limit too small to hold the minimum record count.
    MemoryLimit { limit: usize, record_size: usize },
    /// Workers thread pool initialization error.
    ThreadPoolBuild(rayon::ThreadPoolBuildError),
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// A file could not be opened or created.
    Open { path: PathBuf, source: io::Error },
    /// A read or write transferred fewer bytes than expected.
    Io { path: PathBuf, source: io::Error },
    /// Trailing partial record detected in an input stream.
    Corrupted { path: PathBuf },
    /// Final rename of the sorted result failed.
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::MemoryLimit { .. } => None,
            SortError::ThreadPoolBuild(err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::Open { source, .. } => Some(source),
            SortError::Io { source, .. } => Some(source),
            SortError::Corrupted { .. } => None,
            SortError::Rename { source, .. } => Some(source),
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::MemoryLimit { limit, record_size } => write!(
                f,
                "memory limit of {} bytes is too small to hold {} records of {} bytes",
                limit, MIN_MEM_RECORDS, record_size
            ),
            SortError::ThreadPoolBuild(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::Open { path, source } => write!(f, "file {} not opened: {}", path.display(), source),
            SortError::Io { path, source } => write!(f, "I/O operation on {} failed: {}", path.display(), source),
            SortError::Corrupted { path } => write!(
                f,
                "file {} holds an incomplete trailing record and may be damaged",
                path.display()
            ),
            SortError::Rename { from, to, source } => write!(
                f,
                "sorted result {} not renamed to {}: {}",
                from.display(),
                to.display(),
                source
            ),
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort chunk halves in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(self.threads_number, self.tmp_dir.as_deref())
    }

    /// Sets number of threads to be used to sort chunk halves in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        self
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        self
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
        }
    }
}

/// External sorter for files of fixed-size binary records.
pub struct ExternalSorter {
    /// Chunk sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory holding intermediate chunk files.
    tmp_dir: tempfile::TempDir,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort chunk halves in parallel.
    ///   If the parameter is [`None`] threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store temporary data. If the parameter is [`None`]
    ///   the current directory is used, which keeps the final rename on one filesystem.
    pub fn new(threads_number: Option<usize>, tmp_path: Option<&Path>) -> Result<Self, SortError> {
        Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        })
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder.build().map_err(SortError::ThreadPoolBuild)?;

        Ok(thread_pool)
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = tempfile::tempdir_in(tmp_path.unwrap_or_else(|| Path::new(".")))
            .map_err(SortError::TempDir)?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        Ok(tmp_dir)
    }

    /// Sorts the records of the `input` file into the `output` file using at
    /// most `mem_limit` bytes of buffer memory.
    ///
    /// The input is first split into sorted chunk files of at most half the
    /// limit each, which are then merged pairwise until a single sorted file
    /// remains and is renamed to `output`. Intermediate chunks are removed
    /// as they are consumed.
    ///
    /// # Arguments
    /// * `input` - File of fixed-size records to be sorted
    /// * `output` - Destination path of the sorted result
    /// * `mem_limit` - Memory limit in bytes; must hold at least [`MIN_MEM_RECORDS`] records
    pub fn sort<T: Record>(&self, input: &Path, output: &Path, mem_limit: usize) -> Result<(), SortError> {
        let record_size = mem::size_of::<T>();
        let mem_records = mem_limit.checked_div(record_size).unwrap_or(0);

        if mem_records < MIN_MEM_RECORDS {
            return Err(SortError::MemoryLimit { limit: mem_limit, record_size });
        }

        log::info!("splitting {} into sorted chunks", input.display());
        let mut split_namer = ChunkNamer::new(self.tmp_dir.path(), "tmp_split_file_");
        let chunks = split::split::<T>(&self.thread_pool, input, &mut split_namer, mem_records)?;

        log::info!("merging {} chunks into {}", chunks.len(), output.display());
        let mut merge_namer = ChunkNamer::new(self.tmp_dir.path(), "tmp_merge_file_");
        merge::merge_files::<T>(chunks, output, &mut merge_namer, mem_records)
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use rand::Rng;
    use rstest::*;

    use super::{ExternalSorter, ExternalSorterBuilder, SortError};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[fixture]
    fn sorter(tmp_dir: tempfile::TempDir) -> (ExternalSorter, tempfile::TempDir) {
        let sorter = ExternalSorterBuilder::new()
            .with_threads_number(2)
            .with_tmp_dir(tmp_dir.path())
            .build()
            .unwrap();
        (sorter, tmp_dir)
    }

    fn write_records(path: &Path, records: &[u32]) {
        fs::write(path, bytemuck::cast_slice(records)).unwrap();
    }

    fn read_records(path: &Path) -> Vec<u32> {
        bytemuck::pod_collect_to_vec(&fs::read(path).unwrap())
    }

    #[rstest]
    fn test_external_sort(sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        let output = tmp_dir.path().join("output");

        let mut rng = rand::thread_rng();
        let records: Vec<u32> = (0..10_000).map(|_| rng.gen()).collect();
        write_records(&input, &records);

        // 8 records fit: 4 per split half, many split and merge passes
        sorter.sort::<u32>(&input, &output, 32).unwrap();

        let mut expected = records;
        expected.sort_unstable();
        assert_eq!(read_records(&output), expected);

        let left_over = fs::read_dir(sorter.tmp_dir.path()).unwrap().count();
        assert_eq!(left_over, 0, "no intermediate chunk files may remain");
    }

    #[rstest]
    fn test_sort_is_idempotent_on_sorted_input(sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        let output = tmp_dir.path().join("output");

        let records: Vec<u32> = (0..100).collect();
        write_records(&input, &records);

        sorter.sort::<u32>(&input, &output, 64).unwrap();

        assert_eq!(fs::read(&input).unwrap(), fs::read(&output).unwrap());
    }

    #[rstest]
    fn test_sort_single_record(sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        let output = tmp_dir.path().join("output");

        write_records(&input, &[42]);

        sorter.sort::<u32>(&input, &output, 32).unwrap();

        assert_eq!(read_records(&output), vec![42]);
    }

    #[rstest]
    fn test_sort_empty_input(sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        let output = tmp_dir.path().join("output");

        write_records(&input, &[]);

        sorter.sort::<u32>(&input, &output, 32).unwrap();

        assert_eq!(read_records(&output), Vec::<u32>::new());
    }

    #[rstest]
    #[case(0)]
    #[case(31)]
    fn test_sort_memory_limit_too_small(#[case] mem_limit: usize, sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        write_records(&input, &[3, 2, 1]);

        let err = sorter
            .sort::<u32>(&input, &tmp_dir.path().join("output"), mem_limit)
            .unwrap_err();

        assert!(matches!(err, SortError::MemoryLimit { .. }));
    }

    #[rstest]
    fn test_sort_rejects_truncated_input(sorter: (ExternalSorter, tempfile::TempDir)) {
        let (sorter, tmp_dir) = sorter;
        let input = tmp_dir.path().join("input");
        let output = tmp_dir.path().join("output");
        fs::write(&input, [0u8; 4002]).unwrap();

        let err = sorter.sort::<u32>(&input, &output, 1024).unwrap_err();

        assert!(matches!(err, SortError::Corrupted { .. }));
        assert!(!output.exists(), "no output may be produced for damaged input");
    }
}
