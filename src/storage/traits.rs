//! Storage traits and error types

use crate::harvest::Record;
use crate::storage::{CategoryCount, StoredRecord};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value is malformed: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable sink for harvested records
///
/// Implementations are shared between concurrently running sessions and
/// must serialize their own access to the underlying store.
pub trait RecordStore: Send + Sync {
    /// Upserts a batch of records as one unit
    ///
    /// Records are matched by URL. An existing row has its name, price,
    /// rating, review count and observation time refreshed; its category is
    /// left as first recorded.
    ///
    /// # Returns
    ///
    /// The number of records written
    fn save_records(&self, records: &[Record], category: &str) -> StorageResult<usize>;

    /// Most recently observed records, newest first
    fn recent_records(&self, limit: usize) -> StorageResult<Vec<StoredRecord>>;

    /// Total number of stored records
    fn count_records(&self) -> StorageResult<u64>;

    /// Number of records observed at or after `since`
    fn count_observed_since(&self, since: DateTime<Utc>) -> StorageResult<u64>;

    /// Record counts per category, largest first
    fn category_counts(&self) -> StorageResult<Vec<CategoryCount>>;
}
