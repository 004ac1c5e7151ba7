//! Journal directory management.
//!
//! A journal lives in a directory shared with other journals:
//!
//! ```text
//! <directory>/
//! ├─ <name>.lock        # Advisory lock for single-process access
//! ├─ <name>-1.log       # Segment files, one per segment id
//! ├─ <name>-2.log
//! └─ ...
//! ```
//!
//! The lock file ensures only one process opens a journal at a time.

use crate::config::{parse_segment_file_name, segment_path};
use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// A segment file found in a journal directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentFileEntry {
    /// Id parsed from the file name.
    pub id: u64,
    /// Full path of the file.
    pub path: PathBuf,
}

/// Holds the directory lock of an open journal.
///
/// The lock is released when this value is dropped.
#[derive(Debug)]
pub struct JournalDir {
    /// Directory path.
    path: PathBuf,
    /// Journal name.
    name: String,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl JournalDir {
    /// Creates the directory if needed and takes the journal's lock.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalLocked`] if another handle holds the lock,
    /// or an error if the path is not a usable directory.
    pub fn open(path: &Path, name: &str) -> CoreResult<Self> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_format(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path(path, name))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::JournalLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            name: name.to_string(),
            _lock_file: lock_file,
        })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the path of the segment file with the given id.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        segment_path(&self.path, &self.name, id)
    }

    /// Lists this journal's segment files ordered by id.
    ///
    /// # Errors
    ///
    /// Fails if the directory cannot be read.
    pub fn segment_files(&self) -> CoreResult<Vec<SegmentFileEntry>> {
        list_segment_files(&self.path, &self.name)
    }

    /// Returns the bytes available to this process on the directory's file
    /// system.
    ///
    /// # Errors
    ///
    /// Fails if the file system cannot be queried.
    pub fn available_space(&self) -> CoreResult<u64> {
        Ok(fs2::available_space(&self.path)?)
    }

    /// Syncs the directory so file creations and deletions are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs the directory so file creations and deletions are durable.
    #[cfg(not(unix))]
    pub fn sync(&self) -> CoreResult<()> {
        // NTFS journals metadata updates itself.
        Ok(())
    }
}

/// Returns the lock file path of journal `name` in `directory`.
#[must_use]
pub fn lock_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{name}.lock"))
}

/// Lists the segment files of journal `name` in `directory`, ordered by id,
/// without taking the journal's lock.
///
/// # Errors
///
/// Fails if the directory cannot be read.
pub fn list_segment_files(directory: &Path, name: &str) -> CoreResult<Vec<SegmentFileEntry>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if let Some(id) = parse_segment_file_name(name, file_name) {
            files.push(SegmentFileEntry {
                id,
                path: entry.path(),
            });
        }
    }
    files.sort_by_key(|file| file.id);
    Ok(files)
}
