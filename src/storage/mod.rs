//! Storage module for persisting harvested records
//!
//! This module handles all database operations for the harvester:
//! - SQLite database initialization and schema management
//! - Transactional per-page record upserts keyed by URL
//! - Read-side queries for export, health checks and activity alerts

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{RecordStore, StorageError, StorageResult};

use crate::harvest::Record;
use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::open(path)
}

/// A record as persisted, with its row metadata
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub record: Record,
    pub first_seen_at: String,
}

/// Number of records stored under one category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryCount {
    pub category: String,
    pub records: u64,
}
