//! `rawsort` is an external merge sort for files of fixed-size binary records.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External
//! sorting is required when the data being sorted do not fit into the main memory (RAM) of a computer
//! and instead must be resided in slower external memory, usually a hard disk drive. For more
//! information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! Sorting happens in two phases under a single memory limit:
//!
//! * **Split:**
//!   the input file is read in memory-sized blocks; the two halves of every block are sorted in place
//!   and written out as separate chunk files concurrently.
//! * **Merge:**
//!   pairs of sorted chunks are repeatedly merged into new chunks until a single fully sorted file
//!   remains, which is renamed to the requested output path. Consumed chunks are removed as soon as
//!   their reader is done with them, so disk usage stays proportional to the data, and process memory
//!   stays within the configured limit no matter how large the input is.
//!
//! Records are fixed-size, totally-ordered binary values in native byte order; any
//! [`bytemuck::Pod`] type with a total order works, `u32` being the typical instantiation.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use rawsort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .build()
//!         .unwrap();
//!
//!     sorter
//!         .sort::<u32>(Path::new("input"), Path::new("output"), 120 * 1024 * 1024)
//!         .unwrap();
//! }
//! ```

pub mod chunk;
pub mod merge;
pub mod record;
pub mod sort;
pub mod split;
pub mod verify;

pub use chunk::{ChunkNamer, ChunkReader, ChunkWriter};
pub use record::Record;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, MIN_MEM_RECORDS};
pub use verify::is_sorted;
