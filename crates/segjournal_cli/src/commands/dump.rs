//! Dump command implementation.

use segjournal_core::scan::{scan_journal, scan_segment_with, ScannedEntry};
use serde::Serialize;
use std::path::Path;

/// Number of payload bytes shown in text output.
const PREVIEW_BYTES: usize = 32;

/// Entry representation for output.
#[derive(Debug, Serialize)]
pub struct EntryInfo {
    /// Entry index.
    pub index: u64,
    /// Segment id.
    pub segment: u64,
    /// Offset of the frame within the segment file.
    pub position: usize,
    /// Payload size in bytes.
    pub size: usize,
    /// Hex-encoded payload.
    pub data: String,
}

/// Runs the dump command.
pub fn run(
    path: &Path,
    name: &str,
    max_entry_size: usize,
    from: u64,
    limit: Option<usize>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = read_entries(path, name, max_entry_size, from, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        _ => {
            print_text_output(&entries);
        }
    }

    Ok(())
}

fn read_entries(
    path: &Path,
    name: &str,
    max_entry_size: usize,
    from: u64,
    limit: Option<usize>,
) -> Result<Vec<EntryInfo>, Box<dyn std::error::Error>> {
    let max_entries = limit.unwrap_or(usize::MAX);
    let mut segments = scan_journal(path, name, max_entry_size)?.segments;
    segments.sort_by_key(|report| report.first_index());

    let mut entries = Vec::new();
    for report in segments {
        if entries.len() >= max_entries {
            break;
        }
        if report.entry_count == 0 || report.last_index() < from {
            continue;
        }
        let segment = report.descriptor.id;
        scan_segment_with(&report.path, max_entry_size, |entry: ScannedEntry| {
            if entry.index >= from && entries.len() < max_entries {
                entries.push(EntryInfo {
                    index: entry.index,
                    segment,
                    position: entry.position,
                    size: entry.data.len(),
                    data: to_hex(&entry.data),
                });
            }
        })?;
    }

    Ok(entries)
}

fn print_text_output(entries: &[EntryInfo]) {
    println!("{:>10}  {:>8}  {:>10}  {:>8}  data", "index", "segment", "offset", "size");
    for entry in entries {
        let preview_len = (PREVIEW_BYTES * 2).min(entry.data.len());
        let ellipsis = if preview_len < entry.data.len() { "..." } else { "" };
        println!(
            "{:>10}  {:>8}  {:>10}  {:>8}  {}{}",
            entry.index,
            entry.segment,
            entry.position,
            entry.size,
            &entry.data[..preview_len],
            ellipsis
        );
    }
    println!();
    println!("{} entries", entries.len());
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use segjournal_core::{Journal, JournalConfig};
    use tempfile::tempdir;

    #[test]
    fn reads_from_index_with_limit() {
        let dir = tempdir().unwrap();
        {
            let journal =
                Journal::open(JournalConfig::new(dir.path()).max_segment_size(256)).unwrap();
            let mut writer = journal.writer().unwrap();
            for i in 0..25u8 {
                writer.append(&[i; 10]).unwrap();
            }
        }

        let entries = read_entries(dir.path(), "journal", 1024, 9, Some(5)).unwrap();
        let indices: Vec<_> = entries.iter().map(|entry| entry.index).collect();
        assert_eq!(indices, vec![9, 10, 11, 12, 13]);
        assert_eq!(entries[2].segment, 2);
        assert_eq!(entries[2].position, 64);
        assert_eq!(entries[0].data, "08".repeat(10));

        let all = read_entries(dir.path(), "journal", 1024, 1, None).unwrap();
        assert_eq!(all.len(), 25);
    }

    #[test]
    fn hex_encodes_lowercase() {
        assert_eq!(to_hex(&[0x00, 0xab, 0x7f]), "00ab7f");
    }
}
