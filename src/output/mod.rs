//! Output module for summaries and backups
//!
//! This module handles:
//! - Writing a plain-text backup of stored records
//! - Printing record statistics and recent records
//! - Summarizing a direct harvest run and published job results

mod backup;
pub mod stats;

pub use backup::{format_backup, write_backup};
pub use stats::{
    format_result_line, load_statistics, print_recent, print_results, print_run_summary,
    print_statistics, HarvestStatistics,
};

/// Records printed after a run or an export
pub const RECENT_LIMIT: usize = 10;

/// Records written to the backup file
pub const BACKUP_LIMIT: usize = 1000;
