//! Pairwise chunk merging.
//!
//! The scheduler reduces a FIFO queue of sorted chunk files to a single one
//! by repeated two-way merges, then renames the survivor to the requested
//! output path. Pairwise merging keeps memory bounded by a fixed fraction of
//! the budget per pass regardless of the number of chunks, at the cost of
//! ceil(log2 N) passes; disk bandwidth dominates at this scale, not the
//! comparison count.

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::chunk::{ChunkNamer, ChunkReader, ChunkWriter};
use crate::record::Record;
use crate::sort::SortError;

/// Merges sorted chunk files pairwise until one remains and renames it to
/// `output`.
///
/// Read buffers hold a quarter of the memory budget each, the write buffer
/// the remaining half. Consumed chunk files are removed by their readers; on
/// failure the partial output chunk and all still-queued chunks are removed
/// before the error propagates.
pub fn merge_files<T: Record>(
    chunks: Vec<PathBuf>,
    output: &Path,
    namer: &mut ChunkNamer,
    mem_records: usize,
) -> Result<(), SortError> {
    let read_capacity = mem_records / 4;
    let write_capacity = read_capacity * 2;

    let mut queue: VecDeque<PathBuf> = chunks.into();

    while queue.len() > 1 {
        // both pops are covered by the loop condition
        let (lhs, rhs) = match (queue.pop_front(), queue.pop_front()) {
            (Some(lhs), Some(rhs)) => (lhs, rhs),
            _ => break,
        };

        let merged = namer.next_name();
        log::debug!(
            "merging {} and {} into {}",
            lhs.display(),
            rhs.display(),
            merged.display()
        );

        if let Err(err) = merge_pair::<T>(lhs, rhs, &merged, read_capacity, write_capacity) {
            let _ = fs::remove_file(&merged);
            for stale in &queue {
                let _ = fs::remove_file(stale);
            }
            return Err(err);
        }

        queue.push_back(merged);
    }

    let sorted = match queue.pop_front() {
        Some(sorted) => sorted,
        // the splitter produces at least one chunk for any readable input
        None => return Ok(()),
    };

    fs::rename(&sorted, output).map_err(|err| SortError::Rename {
        from: sorted,
        to: output.to_owned(),
        source: err,
    })
}

fn merge_pair<T: Record>(
    lhs: PathBuf,
    rhs: PathBuf,
    merged: &Path,
    read_capacity: usize,
    write_capacity: usize,
) -> Result<(), SortError> {
    let lhs = ChunkReader::<T>::open(lhs, read_capacity)?;
    let rhs = ChunkReader::<T>::open(rhs, read_capacity)?;
    let mut out = ChunkWriter::create(merged.to_owned(), write_capacity)?;

    merge_streams(lhs, rhs, &mut out)?;
    out.finish()
}

/// Merges two sorted record streams into one sorted output stream.
///
/// One comparison per record while both sides have records; once either
/// source is depleted and drained, the other side is forwarded in bulk
/// blocks with no further comparisons. The left source wins ties, which
/// keeps the merge stable.
pub fn merge_streams<T: Record>(
    mut lhs: ChunkReader<T>,
    mut rhs: ChunkReader<T>,
    out: &mut ChunkWriter<T>,
) -> Result<(), SortError> {
    lhs.read_next()?;
    rhs.read_next()?;

    loop {
        match (lhs.head(), rhs.head()) {
            (Some(&l), Some(&r)) => {
                if r < l {
                    out.store(r)?;
                    rhs.advance();
                } else {
                    out.store(l)?;
                    lhs.advance();
                }
            }
            _ => {
                if lhs.is_empty() && !lhs.depleted() {
                    lhs.read_next()?;
                    continue;
                }
                if rhs.is_empty() && !rhs.depleted() {
                    rhs.read_next()?;
                    continue;
                }
                break;
            }
        }
    }

    // at most one side still has records left at this point
    drain(lhs, out)?;
    drain(rhs, out)
}

/// Forwards whatever is left of `reader` to the output block by block.
fn drain<T: Record>(mut reader: ChunkReader<T>, out: &mut ChunkWriter<T>) -> Result<(), SortError> {
    loop {
        if !reader.is_empty() {
            out.store_block(reader.pending())?;
            reader.consume_all();
        }
        if reader.depleted() {
            return Ok(());
        }
        reader.read_next()?;
    }
}
