//! Verify command implementation.

use segjournal_core::scan::{scan_journal, JournalScan};
use std::path::Path;

/// Runs the verify command.
pub fn run(path: &Path, name: &str, max_entry_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying journal {name:?} at {path:?}");
    println!();

    let scan = scan_journal(path, name, max_entry_size)?;
    if scan.segments.is_empty() && scan.issues.is_empty() {
        println!("No segment files found (this may be normal for a new journal)");
        return Ok(());
    }
    print_result(&scan);

    println!();
    if scan.is_healthy() {
        println!("✓ Journal verification passed");
        Ok(())
    } else {
        println!("✗ Journal verification failed");
        Err("Verification failed".into())
    }
}

fn print_result(scan: &JournalScan) {
    for report in &scan.segments {
        println!(
            "  segment {:>6}: indices {}..={} ({} entries, {})",
            report.descriptor.id,
            report.first_index(),
            report.last_index(),
            report.entry_count,
            report.end.describe()
        );
    }
    println!();
    println!("  Segments checked: {}", scan.segments.len());
    println!("  Entries checked:  {}", scan.entry_count());
    println!("  Issues:           {}", scan.issues.len());
    for issue in &scan.issues {
        println!("    - {issue}");
    }
}
