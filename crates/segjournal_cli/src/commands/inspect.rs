//! Inspect command implementation.

use segjournal_core::scan::{scan_journal, JournalScan};
use serde::Serialize;
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal directory.
    pub path: String,
    /// Journal name.
    pub name: String,
    /// Number of readable segments.
    pub segment_count: usize,
    /// Total size of segment files in bytes.
    pub total_size: u64,
    /// Number of valid entries.
    pub entry_count: u64,
    /// First index, if any segment is readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_index: Option<u64>,
    /// Last index, if any segment is readable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_index: Option<u64>,
    /// Problems found while scanning.
    pub issues: Vec<String>,
    /// Per-segment details (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segments: Option<Vec<SegmentStats>>,
}

/// Statistics for a single segment.
#[derive(Debug, Serialize)]
pub struct SegmentStats {
    /// Segment id.
    pub id: u64,
    /// File name.
    pub file: String,
    /// First index.
    pub first_index: u64,
    /// Last index.
    pub last_index: u64,
    /// Number of valid entries.
    pub entry_count: u64,
    /// Segment size from the descriptor.
    pub max_segment_size: u32,
    /// Bytes in use, descriptor included.
    pub used_bytes: usize,
    /// Creation time in unix milliseconds.
    pub updated: i64,
    /// How the segment ends.
    pub end: String,
}

impl InspectResult {
    fn from_scan(path: &Path, name: &str, scan: &JournalScan, show_segments: bool) -> Self {
        let segments = show_segments.then(|| {
            scan.segments
                .iter()
                .map(|report| SegmentStats {
                    id: report.descriptor.id,
                    file: report
                        .path
                        .file_name()
                        .map(|file| file.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    first_index: report.first_index(),
                    last_index: report.last_index(),
                    entry_count: report.entry_count,
                    max_segment_size: report.descriptor.max_segment_size,
                    used_bytes: report.valid_bytes,
                    updated: report.descriptor.updated,
                    end: report.end.describe().to_string(),
                })
                .collect()
        });

        Self {
            path: path.display().to_string(),
            name: name.to_string(),
            segment_count: scan.segments.len(),
            total_size: scan.segments.iter().map(|report| report.file_len).sum(),
            entry_count: scan.entry_count(),
            first_index: scan.segments.iter().map(|report| report.first_index()).min(),
            last_index: scan.segments.iter().map(|report| report.last_index()).max(),
            issues: scan.issues.iter().map(ToString::to_string).collect(),
            segments,
        }
    }
}

/// Runs the inspect command.
pub fn run(
    path: &Path,
    name: &str,
    max_entry_size: usize,
    show_segments: bool,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let scan = scan_journal(path, name, max_entry_size)?;
    if scan.segments.is_empty() && scan.issues.is_empty() {
        return Err(format!("No journal named {name:?} found at {path:?}").into());
    }
    let result = InspectResult::from_scan(path, name, &scan, show_segments);

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("SegJournal Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!("Name: {}", result.name);
    println!();
    println!("Storage:");
    println!("  Segments:    {}", result.segment_count);
    println!("  Total size:  {}", format_size(result.total_size));
    println!();
    println!("Entries:");
    println!("  Count:       {}", result.entry_count);
    if let (Some(first), Some(last)) = (result.first_index, result.last_index) {
        println!("  Range:       {first}..={last}");
    }

    if let Some(segments) = &result.segments {
        println!();
        println!("Segments:");
        for segment in segments {
            println!(
                "  [{}] {} indices {}..={} ({} entries, {} of {} bytes, {})",
                segment.id,
                segment.file,
                segment.first_index,
                segment.last_index,
                segment.entry_count,
                segment.used_bytes,
                segment.max_segment_size,
                segment.end
            );
        }
    }

    if !result.issues.is_empty() {
        println!();
        println!("Issues:");
        for issue in &result.issues {
            println!("  - {issue}");
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
