//! Input splitting phase.
//!
//! Turns one arbitrarily large input file into a sequence of individually
//! sorted chunk files, each holding at most half of the memory budget worth
//! of records. The input is read in double-buffered blocks; the two halves
//! of every full block are sorted and saved concurrently.

use std::fs;
use std::io::prelude::*;
use std::path::{Path, PathBuf};

use crate::chunk::ChunkNamer;
use crate::record::{read_block, Record};
use crate::sort::SortError;

/// Splits `input` into sorted chunk files named by `namer`.
///
/// `mem_records` is the total memory budget expressed in records; each chunk
/// holds at most half of it. On failure every chunk file written so far is
/// removed before the error propagates, so a partial chunk list never
/// outlives the call.
pub fn split<T: Record>(
    pool: &rayon::ThreadPool,
    input: &Path,
    namer: &mut ChunkNamer,
    mem_records: usize,
) -> Result<Vec<PathBuf>, SortError> {
    let mut chunks = Vec::new();

    match split_into::<T>(pool, input, namer, mem_records, &mut chunks) {
        Ok(()) => {
            log::debug!("split {} into {} chunks", input.display(), chunks.len());
            Ok(chunks)
        }
        Err(err) => {
            // written chunks are useless once the split fails; a name may not
            // have made it to disk, so removal failures are not reported
            for chunk in &chunks {
                let _ = fs::remove_file(chunk);
            }
            Err(err)
        }
    }
}

fn split_into<T: Record>(
    pool: &rayon::ThreadPool,
    input: &Path,
    namer: &mut ChunkNamer,
    mem_records: usize,
    chunks: &mut Vec<PathBuf>,
) -> Result<(), SortError> {
    let mut file = fs::File::open(input).map_err(|err| SortError::Open {
        path: input.to_owned(),
        source: err,
    })?;

    let half = mem_records / 2;
    let mut mem = vec![T::zeroed(); half * 2];
    let (lo, hi) = mem.split_at_mut(half);

    loop {
        let (read_lo, eof) = read_block(&mut file, lo, input)?;

        if eof {
            // A short (possibly empty) final block. An empty block yields a
            // chunk only when the input itself was empty, so the scheduler
            // still has something to rename into the output.
            if read_lo > 0 || chunks.is_empty() {
                let name = namer.next_name();
                chunks.push(name.clone());
                sort_and_save(&name, &mut lo[..read_lo])?;
            }
            return Ok(());
        }

        let (read_hi, eof) = read_block(&mut file, hi, input)?;

        if read_hi == 0 {
            // The input length was an exact multiple of the block size; the
            // first half is full and the second read hit EOF straight away.
            let name = namer.next_name();
            chunks.push(name.clone());
            sort_and_save(&name, lo)?;
            return Ok(());
        }

        let name_lo = namer.next_name();
        let name_hi = namer.next_name();
        chunks.push(name_lo.clone());
        chunks.push(name_hi.clone());

        // The halves are disjoint slices writing to distinct files, so the
        // two tasks need no synchronization beyond the join.
        let (res_lo, res_hi) = pool.join(
            || sort_and_save(&name_lo, &mut lo[..read_lo]),
            || sort_and_save(&name_hi, &mut hi[..read_hi]),
        );
        res_lo?;
        res_hi?;

        if eof {
            return Ok(());
        }
    }
}

/// Sorts a block in place and writes it out as one chunk file.
fn sort_and_save<T: Record>(path: &Path, records: &mut [T]) -> Result<(), SortError> {
    records.sort_unstable();

    let mut file = fs::File::create(path).map_err(|err| SortError::Open {
        path: path.to_owned(),
        source: err,
    })?;

    file.write_all(bytemuck::cast_slice(records))
        .map_err(|err| SortError::Io {
            path: path.to_owned(),
            source: err,
        })
}
