//! Journal configuration.

use crate::codec::{DESCRIPTOR_BYTES, ENTRY_HEADER_BYTES};
use crate::error::{CoreError, CoreResult};
use segjournal_storage::StorageLevel;
use std::path::{Path, PathBuf};

/// Default journal name, used as the segment file prefix.
pub const DEFAULT_NAME: &str = "journal";
/// Default maximum segment file size.
pub const DEFAULT_MAX_SEGMENT_SIZE: u32 = 32 * 1024 * 1024;
/// Default maximum entry payload size.
pub const DEFAULT_MAX_ENTRY_SIZE: u32 = 1024 * 1024;
/// Default sparse index density.
pub const DEFAULT_INDEX_DENSITY: f64 = 0.005;

/// Configuration for opening a journal.
#[derive(Debug, Clone)]
pub struct JournalConfig {
    /// Journal name. Segment files are named `<name>-<id>.log`.
    pub name: String,

    /// Backend used for active segments.
    pub storage_level: StorageLevel,

    /// Directory holding the segment files. Created if missing.
    pub directory: PathBuf,

    /// Size every segment file is preallocated to, descriptor included.
    pub max_segment_size: u32,

    /// Maximum payload size of a single entry.
    pub max_entry_size: u32,

    /// Fraction of entries recorded in each segment's sparse index.
    pub index_density: f64,

    /// Whether committing an index also flushes the current segment.
    pub flush_on_commit: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            storage_level: StorageLevel::Disk,
            directory: PathBuf::from("."),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
            index_density: DEFAULT_INDEX_DENSITY,
            flush_on_commit: false,
        }
    }
}

impl JournalConfig {
    /// Creates a configuration with default values rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Sets the journal name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the journal directory.
    #[must_use]
    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Sets the storage level.
    #[must_use]
    pub const fn storage_level(mut self, level: StorageLevel) -> Self {
        self.storage_level = level;
        self
    }

    /// Sets the maximum segment file size.
    #[must_use]
    pub const fn max_segment_size(mut self, size: u32) -> Self {
        self.max_segment_size = size;
        self
    }

    /// Sets the maximum entry payload size.
    #[must_use]
    pub const fn max_entry_size(mut self, size: u32) -> Self {
        self.max_entry_size = size;
        self
    }

    /// Sets the sparse index density.
    #[must_use]
    pub const fn index_density(mut self, density: f64) -> Self {
        self.index_density = density;
        self
    }

    /// Sets whether commits flush the current segment.
    #[must_use]
    pub const fn flush_on_commit(mut self, value: bool) -> Self {
        self.flush_on_commit = value;
        self
    }

    /// Returns the path of the segment file with the given id.
    #[must_use]
    pub fn segment_path(&self, id: u64) -> PathBuf {
        segment_path(&self.directory, &self.name, id)
    }

    /// Checks every setting.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] naming the first rejected setting.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_config("name must not be empty"));
        }
        if self.name.contains(['/', '\\']) {
            return Err(CoreError::invalid_config(format!(
                "name must not contain path separators: {}",
                self.name
            )));
        }
        if self.max_segment_size as usize <= DESCRIPTOR_BYTES {
            return Err(CoreError::invalid_config(format!(
                "max_segment_size must exceed the {DESCRIPTOR_BYTES} byte descriptor, got {}",
                self.max_segment_size
            )));
        }
        if self.max_entry_size == 0 {
            return Err(CoreError::invalid_config("max_entry_size must be positive"));
        }
        if !(self.index_density > 0.0 && self.index_density < 1.0) {
            return Err(CoreError::invalid_config(format!(
                "index_density must be in (0, 1), got {}",
                self.index_density
            )));
        }
        Ok(())
    }

    /// Largest payload a fresh segment of this configuration can hold.
    #[must_use]
    pub fn segment_payload_capacity(&self) -> usize {
        (self.max_segment_size as usize).saturating_sub(DESCRIPTOR_BYTES + 2 * ENTRY_HEADER_BYTES)
    }
}

/// Builds `<directory>/<name>-<id>.log`.
pub(crate) fn segment_path(directory: &Path, name: &str, id: u64) -> PathBuf {
    directory.join(format!("{name}-{id}.log"))
}

/// Parses the segment id out of a file name if it belongs to journal `name`.
pub(crate) fn parse_segment_file_name(name: &str, file_name: &str) -> Option<u64> {
    let id = file_name
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(".log")?;
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = JournalConfig::default();
        assert_eq!(config.name, "journal");
        assert_eq!(config.storage_level, StorageLevel::Disk);
        assert_eq!(config.max_segment_size, 32 * 1024 * 1024);
        assert_eq!(config.max_entry_size, 1024 * 1024);
        assert!(!config.flush_on_commit);
        config.validate().unwrap();
    }

    #[test]
    fn builder_pattern() {
        let config = JournalConfig::new("/tmp/j")
            .name("raft")
            .storage_level(StorageLevel::Mapped)
            .max_segment_size(4096)
            .max_entry_size(128)
            .index_density(0.5)
            .flush_on_commit(true);

        assert_eq!(config.name, "raft");
        assert_eq!(config.storage_level, StorageLevel::Mapped);
        assert_eq!(config.max_segment_size, 4096);
        assert_eq!(config.max_entry_size, 128);
        assert!(config.flush_on_commit);
        assert_eq!(config.segment_path(3), PathBuf::from("/tmp/j/raft-3.log"));
        config.validate().unwrap();
    }

    #[test]
    fn validate_rejects_bad_settings() {
        let base = JournalConfig::default();
        assert!(base.clone().name("").validate().is_err());
        assert!(base.clone().name("a/b").validate().is_err());
        assert!(base.clone().max_segment_size(64).validate().is_err());
        assert!(base.clone().max_entry_size(0).validate().is_err());
        assert!(base.clone().index_density(0.0).validate().is_err());
        assert!(base.clone().index_density(1.0).validate().is_err());
        assert!(base.index_density(f64::NAN).validate().is_err());
    }

    #[test]
    fn parses_segment_file_names() {
        assert_eq!(parse_segment_file_name("journal", "journal-1.log"), Some(1));
        assert_eq!(parse_segment_file_name("journal", "journal-42.log"), Some(42));
        assert_eq!(parse_segment_file_name("journal", "journal-.log"), None);
        assert_eq!(parse_segment_file_name("journal", "journal-1.lock"), None);
        assert_eq!(parse_segment_file_name("journal", "other-1.log"), None);
        assert_eq!(parse_segment_file_name("journal", "journal-x1.log"), None);
        assert_eq!(parse_segment_file_name("j", "journal-1.log"), None);
    }
}
