//! Buffered file access.

use crate::access::{check_bounds, FileReader, FileWriter, ReadRegion, WriteRegion, ENTRY_HEADER_BYTES};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// Initial size of a reader's window.
/// Grows when a single read asks for more.
const READ_BUFFER_SIZE: usize = 64 * 1024; // 64 KB

/// Buffered access to one segment file.
///
/// All readers and the writer share one file handle. Every operation is a
/// positioned read or write performed under the handle's lock, so there is
/// no shared cursor state.
#[derive(Debug, Clone)]
pub struct DiskAccess {
    file: Arc<Mutex<File>>,
    capacity: usize,
}

impl DiskAccess {
    pub(crate) fn open(file: &File, capacity: usize) -> StorageResult<Self> {
        Ok(Self {
            file: Arc::new(Mutex::new(file.try_clone()?)),
            capacity,
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn new_reader(&self) -> DiskFileReader {
        DiskFileReader {
            file: Arc::clone(&self.file),
            capacity: self.capacity,
            buffer: vec![0u8; READ_BUFFER_SIZE.min(self.capacity)],
            window_start: None,
            window_len: 0,
        }
    }

    pub(crate) fn new_writer(&self) -> DiskFileWriter {
        DiskFileWriter {
            file: Arc::clone(&self.file),
            capacity: self.capacity,
            scratch: Vec::new(),
            closed: false,
        }
    }
}

/// A reader with a private window over the file.
///
/// # Window Management
///
/// - Reads inside the window are served without I/O
/// - Forward reads past the window keep the overlapping tail, move it to the
///   front and refill behind it
/// - Backward reads discard the window and fetch from the new position
/// - The window grows when a single read is larger than it
pub struct DiskFileReader {
    file: Arc<Mutex<File>>,
    capacity: usize,
    buffer: Vec<u8>,
    /// File position of `buffer[0]`, `None` while the window is empty.
    window_start: Option<usize>,
    /// Number of valid bytes in the window.
    window_len: usize,
}

impl DiskFileReader {
    /// Refills the window so it starts at `position`.
    ///
    /// `buffer[..keep]` must already hold the file bytes at
    /// `position..position + keep`.
    fn fill(&mut self, position: usize, keep: usize, size: usize) -> StorageResult<()> {
        if size > self.buffer.len() {
            let new_size = size.next_power_of_two().min(self.capacity).max(size);
            self.buffer.resize(new_size, 0);
        }

        let end = self.buffer.len().min(self.capacity - position);
        let read = read_fully(&self.file, position + keep, &mut self.buffer[keep..end]);
        let read = match read {
            Ok(read) => read,
            Err(e) => {
                self.invalidate_cache();
                return Err(e.into());
            }
        };

        let available = keep + read;
        if available < size {
            self.invalidate_cache();
            return Err(StorageError::ShortRead {
                position,
                expected: size,
                actual: available,
            });
        }

        self.window_start = Some(position);
        self.window_len = available;
        Ok(())
    }
}

impl FileReader for DiskFileReader {
    fn invalidate_cache(&mut self) {
        self.window_start = None;
        self.window_len = 0;
    }

    fn read(&mut self, position: usize, size: usize) -> StorageResult<ReadRegion<'_>> {
        check_bounds(position, size, self.capacity)?;

        match self.window_start {
            Some(start) if position >= start => {
                let offset = position - start;
                if offset + size <= self.window_len {
                    return Ok(ReadRegion::Buffered(&self.buffer[offset..offset + size]));
                }

                let keep = self.window_len.saturating_sub(offset);
                if keep > 0 {
                    self.buffer.copy_within(offset..offset + keep, 0);
                }
                self.fill(position, keep, size)?;
            }
            _ => self.fill(position, 0, size)?,
        }

        Ok(ReadRegion::Buffered(&self.buffer[..size]))
    }
}

/// The writer for a buffered activation.
///
/// Frames are assembled in a scratch buffer and written with one positioned
/// write on commit.
pub struct DiskFileWriter {
    file: Arc<Mutex<File>>,
    capacity: usize,
    scratch: Vec<u8>,
    closed: bool,
}

impl DiskFileWriter {
    fn check_open(&self) -> StorageResult<()> {
        if self.closed {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl FileWriter for DiskFileWriter {
    fn write_empty_header(&mut self, position: usize) -> StorageResult<()> {
        self.check_open()?;
        check_bounds(position, ENTRY_HEADER_BYTES, self.capacity)?;
        write_fully(&self.file, position, &[0u8; ENTRY_HEADER_BYTES])?;
        Ok(())
    }

    fn start_write(&mut self, position: usize, size: usize) -> StorageResult<WriteRegion<'_>> {
        self.check_open()?;
        check_bounds(position, size, self.capacity)?;
        self.scratch.clear();
        self.scratch.resize(size, 0);
        Ok(WriteRegion::Buffered(&mut self.scratch[..]))
    }

    fn commit_write(&mut self, position: usize, size: usize) -> StorageResult<()> {
        self.check_open()?;
        check_bounds(position, size, self.capacity)?;
        if size > self.scratch.len() {
            return Err(StorageError::OutOfBounds {
                position,
                len: size,
                capacity: self.scratch.len(),
            });
        }
        write_fully(&self.file, position, &self.scratch[..size])?;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_open()?;
        let mut file = self.file.lock();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if !self.closed {
            self.flush()?;
            self.closed = true;
        }
        Ok(())
    }
}

/// Reads until `buf` is full or the file ends. Returns the bytes read.
fn read_fully(file: &Mutex<File>, position: usize, buf: &mut [u8]) -> io::Result<usize> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(position as u64))?;

    let mut total = 0;
    while total < buf.len() {
        match file.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

fn write_fully(file: &Mutex<File>, position: usize, data: &[u8]) -> io::Result<()> {
    let mut file = file.lock();
    file.seek(SeekFrom::Start(position as u64))?;
    file.write_all(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use tempfile::tempdir;

    fn open_access(dir: &std::path::Path, capacity: usize) -> DiskAccess {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join("disk.log"))
            .unwrap();
        file.set_len(capacity as u64).unwrap();
        DiskAccess::open(&file, capacity).unwrap()
    }

    fn fill_pattern(access: &DiskAccess, len: usize) {
        let mut writer = access.new_writer();
        let mut region = writer.start_write(0, len).unwrap();
        for (i, byte) in region.iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
        drop(region);
        writer.commit_write(0, len).unwrap();
    }

    fn expected(position: usize, size: usize) -> Vec<u8> {
        (position..position + size).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn forward_reads_reuse_the_window() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 256 * 1024);
        fill_pattern(&access, 256 * 1024);

        let mut reader = access.new_reader();
        assert_eq!(&*reader.read(0, 16).unwrap(), &expected(0, 16)[..]);
        assert_eq!(reader.window_start, Some(0));

        // Inside the window: no refill.
        assert_eq!(&*reader.read(1000, 32).unwrap(), &expected(1000, 32)[..]);
        assert_eq!(reader.window_start, Some(0));

        // Straddles the window end: tail is kept and the window moves forward.
        let position = READ_BUFFER_SIZE - 10;
        assert_eq!(&*reader.read(position, 40).unwrap(), &expected(position, 40)[..]);
        assert_eq!(reader.window_start, Some(position));
    }

    #[test]
    fn backward_reads_refetch() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 256 * 1024);
        fill_pattern(&access, 256 * 1024);

        let mut reader = access.new_reader();
        reader.read(200_000, 8).unwrap();
        assert_eq!(&*reader.read(64, 8).unwrap(), &expected(64, 8)[..]);
        assert_eq!(reader.window_start, Some(64));
    }

    #[test]
    fn large_reads_grow_the_window() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 512 * 1024);
        fill_pattern(&access, 512 * 1024);

        let mut reader = access.new_reader();
        let size = READ_BUFFER_SIZE * 2 + 3;
        assert_eq!(&*reader.read(5, size).unwrap(), &expected(5, size)[..]);
        assert!(reader.buffer.len() >= size);
    }

    #[test]
    fn stale_window_until_invalidated() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 4096);
        let mut reader = access.new_reader();
        assert_eq!(&*reader.read(0, 4).unwrap(), &[0u8; 4]);

        let mut writer = access.new_writer();
        let mut region = writer.start_write(0, 4).unwrap();
        region.copy_from_slice(b"abcd");
        drop(region);
        writer.commit_write(0, 4).unwrap();

        assert_eq!(&*reader.read(0, 4).unwrap(), &[0u8; 4]);
        reader.invalidate_cache();
        assert_eq!(&*reader.read(0, 4).unwrap(), b"abcd");
    }

    #[test]
    fn truncated_file_reports_short_read() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 4096);
        access.file.lock().set_len(100).unwrap();

        let mut reader = access.new_reader();
        let result = reader.read(96, 8);
        assert!(matches!(
            result,
            Err(StorageError::ShortRead {
                position: 96,
                expected: 8,
                actual: 4
            })
        ));
        drop(result);
        assert_eq!(reader.window_start, None);
    }

    #[test]
    fn commit_requires_started_region() {
        let dir = tempdir().unwrap();
        let access = open_access(dir.path(), 4096);
        let mut writer = access.new_writer();
        writer.start_write(0, 4).unwrap();
        assert!(writer.commit_write(0, 8).is_err());
    }
}
