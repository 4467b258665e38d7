//! Record statistics and console summaries

use crate::harvest::SessionReport;
use crate::queue::HarvestResult;
use crate::storage::{CategoryCount, RecordStore, StorageResult, StoredRecord};

/// Snapshot of what storage holds
#[derive(Debug, Clone)]
pub struct HarvestStatistics {
    pub total_records: u64,
    pub by_category: Vec<CategoryCount>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn RecordStore) -> StorageResult<HarvestStatistics> {
    Ok(HarvestStatistics {
        total_records: storage.count_records()?,
        by_category: storage.category_counts()?,
    })
}

/// Prints statistics in a human-readable format
pub fn print_statistics(stats: &HarvestStatistics) {
    println!("=== Record Statistics ===\n");
    println!("  Total records: {}", stats.total_records);

    if !stats.by_category.is_empty() {
        println!("\nRecords by Category:");
        for entry in &stats.by_category {
            let percentage = if stats.total_records > 0 {
                (entry.records as f64 / stats.total_records as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", entry.category, entry.records, percentage);
        }
    }
    println!();
}

/// Shortens a name for one-line display
fn truncate(name: &str, max_chars: usize) -> String {
    if name.chars().count() <= max_chars {
        name.to_string()
    } else {
        let cut: String = name.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

/// Prints one line per record, newest first
pub fn print_recent(records: &[StoredRecord]) {
    if records.is_empty() {
        println!("No records stored yet.");
        return;
    }

    println!("Recent records:");
    for stored in records {
        let r = &stored.record;
        println!(
            "- {} | {} | {} | {}",
            truncate(&r.name, 50),
            r.price.as_deref().unwrap_or("N/A"),
            r.rating
                .map(|v| format!("{:.1} stars", v))
                .unwrap_or_else(|| "unrated".to_string()),
            r.category
        );
    }
}

/// Prints a per-category line for a direct run
pub fn print_run_summary(reports: &[SessionReport]) {
    println!("\n=== Harvest Summary ===");
    for report in reports {
        let failed = report.failed_pages();
        println!(
            "  {}: {} record(s), {} of {} page(s) failed [{}]",
            report.job.category,
            report.records_found(),
            failed.len(),
            report.job.page_limit,
            report.status()
        );
    }
    let total: usize = reports.iter().map(SessionReport::records_found).sum();
    println!("  Total: {} record(s)\n", total);
}

/// One line describing a published job result
pub fn format_result_line(result: &HarvestResult) -> String {
    format!(
        "{} | {} | {} record(s) | {} page(s) | {}",
        result.finished_at.format("%Y-%m-%d %H:%M:%S"),
        result.job.category,
        result.records_found,
        result.job.page_limit,
        result.status
    )
}

/// Prints published job results, newest first
pub fn print_results(results: &[HarvestResult]) {
    if results.is_empty() {
        println!("No job results published yet.");
        return;
    }

    println!("Recent job results:");
    for result in results {
        println!("- {}", format_result_line(result));
    }
}
