//! Record model and block-level file reads.

use std::fs;
use std::io;
use std::io::prelude::*;
use std::mem;
use std::path::Path;

use crate::sort::SortError;

/// A fixed-size, totally-ordered record that can be moved between memory and
/// disk as raw bytes in native byte order.
///
/// Any [`bytemuck::Pod`] type with a total order qualifies; the primitive
/// unsigned integers are the typical instantiations.
pub trait Record: bytemuck::Pod + Ord + Send + std::fmt::Debug {}

impl<T> Record for T where T: bytemuck::Pod + Ord + Send + std::fmt::Debug {}

/// Reads records from `file` until `buf` is full or the file ends.
///
/// Returns the number of records read and whether the end of the file was
/// reached. A trailing byte count that is not a multiple of the record size
/// means the last record is incomplete and is reported as corruption rather
/// than silently truncated.
pub(crate) fn read_block<T: Record>(
    file: &mut fs::File,
    buf: &mut [T],
    path: &Path,
) -> Result<(usize, bool), SortError> {
    let record_size = mem::size_of::<T>();
    let bytes = bytemuck::cast_slice_mut::<T, u8>(buf);
    let requested = bytes.len();

    let read = read_fill(file, bytes).map_err(|err| SortError::Io {
        path: path.to_owned(),
        source: err,
    })?;

    if read % record_size != 0 {
        return Err(SortError::Corrupted { path: path.to_owned() });
    }

    Ok((read / record_size, read < requested))
}

/// Reads into `buf` repeatedly until it is full or the reader reports EOF.
fn read_fill(file: &mut fs::File, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;

    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(total)
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::read_block;
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn test_read_block(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("records");
        fs::write(&path, bytemuck::cast_slice(&[3u32, 1, 2])).unwrap();

        let mut file = fs::File::open(&path).unwrap();
        let mut buf = [0u32; 2];

        let (read, eof) = read_block(&mut file, &mut buf, &path).unwrap();
        assert_eq!((read, eof), (2, false));
        assert_eq!(buf, [3, 1]);

        let (read, eof) = read_block(&mut file, &mut buf, &path).unwrap();
        assert_eq!((read, eof), (1, true));
        assert_eq!(buf[..read], [2]);
    }

    #[rstest]
    fn test_read_block_rejects_partial_record(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("damaged");
        fs::write(&path, [0u8; 6]).unwrap();

        let mut file = fs::File::open(&path).unwrap();
        let mut buf = [0u32; 4];

        let err = read_block(&mut file, &mut buf, &path).unwrap_err();
        assert!(matches!(err, SortError::Corrupted { .. }));
    }
}
