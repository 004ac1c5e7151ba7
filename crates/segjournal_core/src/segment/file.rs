//! Segment files on disk.

use crate::codec::{SegmentDescriptor, DESCRIPTOR_BYTES};
use crate::error::{CoreError, CoreResult};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A segment file: its path, its descriptor, and an open handle.
#[derive(Debug)]
pub struct SegmentFile {
    /// Location of the file.
    pub path: PathBuf,
    /// Descriptor read from or written to the file header.
    pub descriptor: SegmentDescriptor,
    /// Read/write handle.
    pub handle: File,
}

impl SegmentFile {
    /// Creates a new segment file preallocated to the descriptor's size.
    ///
    /// # Errors
    ///
    /// Fails if the file already exists or cannot be written.
    pub fn create(path: &Path, descriptor: SegmentDescriptor) -> CoreResult<Self> {
        let mut handle = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;
        handle.set_len(u64::from(descriptor.max_segment_size))?;
        handle.write_all(&descriptor.encode())?;
        handle.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            handle,
        })
    }

    /// Opens an existing segment file and reads its descriptor.
    ///
    /// A file shorter than its descriptor's segment size, as left by an
    /// interrupted preallocation or an external truncation, is extended with
    /// zeros.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFormat`] if the descriptor is unreadable.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let mut handle = OpenOptions::new().read(true).write(true).open(path)?;
        let descriptor = read_descriptor(&mut handle, path)?;

        let expected = u64::from(descriptor.max_segment_size);
        let actual = handle.metadata()?.len();
        if actual < expected {
            tracing::warn!(
                path = %path.display(),
                actual,
                expected,
                "segment file shorter than its descriptor, extending"
            );
            handle.set_len(expected)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            descriptor,
            handle,
        })
    }
}

/// Reads and decodes the descriptor at the start of `file`.
pub(crate) fn read_descriptor(file: &mut File, path: &Path) -> CoreResult<SegmentDescriptor> {
    let mut buf = [0u8; DESCRIPTOR_BYTES];
    file.seek(SeekFrom::Start(0))?;
    let mut filled = 0;
    while filled < DESCRIPTOR_BYTES {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(CoreError::invalid_format(format!(
                "{}: descriptor truncated at {filled} bytes",
                path.display()
            )));
        }
        filled += n;
    }
    SegmentDescriptor::decode(&buf).map_err(|err| match err {
        CoreError::InvalidFormat { message } => {
            CoreError::invalid_format(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}
