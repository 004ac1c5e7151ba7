//! Registry of open journal readers.
//!
//! The journal repositions readers after truncation and compaction. It
//! reaches them through this registry instead of through the segments, which
//! only know reader ids.

use super::reader::ReaderCursor;
use crate::types::ReaderId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Shared handle to one reader's cursor.
pub(crate) type CursorHandle = Arc<Mutex<ReaderCursor>>;

#[derive(Debug, Default)]
pub(crate) struct ReaderRegistry {
    next_id: AtomicU64,
    readers: Mutex<HashMap<ReaderId, CursorHandle>>,
}

impl ReaderRegistry {
    /// Allocates a fresh reader id.
    pub(crate) fn allocate_id(&self) -> ReaderId {
        ReaderId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn insert(&self, id: ReaderId, cursor: CursorHandle) {
        self.readers.lock().insert(id, cursor);
    }

    pub(crate) fn remove(&self, id: ReaderId) -> Option<CursorHandle> {
        self.readers.lock().remove(&id)
    }

    /// Clones out every cursor so callers can lock them without holding the
    /// registry lock.
    pub(crate) fn snapshot(&self) -> Vec<CursorHandle> {
        self.readers.lock().values().cloned().collect()
    }

    pub(crate) fn clear(&self) {
        self.readers.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.readers.lock().len()
    }
}
