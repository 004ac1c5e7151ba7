//! Compact command implementation.

use segjournal_core::dir::list_segment_files;
use segjournal_core::{Journal, JournalConfig};
use std::path::Path;
use tracing::info;

/// Compaction plan.
#[derive(Debug, PartialEq, Eq)]
pub struct CompactPlan {
    /// First index before compaction.
    pub first_index: u64,
    /// First index after compaction.
    pub new_first_index: u64,
    /// Segments that would be deleted.
    pub segments: usize,
    /// Bytes that would be reclaimed.
    pub bytes: u64,
}

/// Runs the compact command.
pub fn run(
    path: &Path,
    name: &str,
    max_entry_size: u32,
    index: u64,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if list_segment_files(path, name)?.is_empty() {
        return Err(format!("No journal named {name:?} found at {path:?}").into());
    }

    println!("Compacting journal {name:?} at {path:?} up to index {index}");
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let journal = Journal::open(
        JournalConfig::new(path)
            .name(name)
            .max_entry_size(max_entry_size),
    )?;
    let plan = plan(&journal, index)?;

    println!("Compaction Analysis:");
    println!("  First index:       {}", plan.first_index);
    println!("  New first index:   {}", plan.new_first_index);
    println!("  Segments removed:  {}", plan.segments);
    println!("  Space reclaimed:   {} bytes", plan.bytes);

    if !dry_run && plan.segments > 0 {
        println!();
        println!("Performing compaction...");
        info!(journal = name, index, segments = plan.segments, "compacting journal");
        let removed = journal.compact(index)?;
        info!(journal = name, removed, first_index = journal.first_index()?, "compacted journal");
        println!("✓ Removed {removed} segments");
    }
    journal.close()?;

    Ok(())
}

fn plan(journal: &Journal, index: u64) -> Result<CompactPlan, Box<dyn std::error::Error>> {
    let first_index = journal.first_index()?;
    let new_first_index = journal.compactable_index(index)?.max(first_index);
    let mut segments = 0;
    let mut bytes = 0;
    for segment in journal.segments()? {
        if segment.first_index() < new_first_index {
            segments += 1;
            bytes += segment.size()?;
        }
    }

    Ok(CompactPlan {
        first_index,
        new_first_index,
        segments,
        bytes,
    })
}
