//! Post-hoc order verification.

use std::fs;
use std::mem;
use std::path::Path;

use crate::record::{read_block, Record};
use crate::sort::SortError;

/// Verification scan window size in bytes.
const WINDOW_SIZE: usize = 10 * 1024 * 1024;

/// Checks that the records of `path` are in non-decreasing order.
///
/// The file is scanned in fixed-size windows so files larger than memory can
/// be verified. Returns `Ok(false)` as soon as an inversion is found; the
/// offending pair is reported through the log for diagnosis.
pub fn is_sorted<T: Record>(path: &Path) -> Result<bool, SortError> {
    let mut file = fs::File::open(path).map_err(|err| SortError::Open {
        path: path.to_owned(),
        source: err,
    })?;

    let capacity = std::cmp::max(WINDOW_SIZE / mem::size_of::<T>(), 1);
    let mut buf = vec![T::zeroed(); capacity];
    let mut previous: Option<T> = None;
    let mut offset = 0usize;

    loop {
        let (read, eof) = read_block(&mut file, &mut buf, path)?;

        for record in &buf[..read] {
            if let Some(previous) = previous {
                if previous > *record {
                    log::error!(
                        "inversion at record {}: {:?} precedes {:?}",
                        offset,
                        previous,
                        record
                    );
                    return Ok(false);
                }
            }
            previous = Some(*record);
            offset += 1;
        }

        if eof {
            return Ok(true);
        }
    }
}
