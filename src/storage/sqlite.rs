//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore trait.

use crate::harvest::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use crate::storage::{CategoryCount, StoredRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const UPSERT_RECORD_SQL: &str = "
    INSERT INTO records (url, name, price, rating, review_count, category, first_seen_at, observed_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
    ON CONFLICT(url) DO UPDATE SET
        name = excluded.name,
        price = excluded.price,
        rating = excluded.rating,
        review_count = excluded.review_count,
        observed_at = excluded.observed_at
";

const SELECT_RECORD_COLUMNS: &str =
    "SELECT id, name, url, price, rating, review_count, category, first_seen_at, observed_at FROM records";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) a database file and initializes the schema
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for concurrent readers and a single writer
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Database("connection lock poisoned".to_string()))
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    // Fixed precision keeps text comparison in SQL consistent with time order
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::Malformed(format!("timestamp '{}': {}", raw, e)))
}

/// Raw column values of one row, converted outside the rusqlite closure
struct RecordRow {
    id: i64,
    name: String,
    url: String,
    price: Option<String>,
    rating: Option<f64>,
    review_count: Option<i64>,
    category: String,
    first_seen_at: String,
    observed_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            url: row.get(2)?,
            price: row.get(3)?,
            rating: row.get(4)?,
            review_count: row.get(5)?,
            category: row.get(6)?,
            first_seen_at: row.get(7)?,
            observed_at: row.get(8)?,
        })
    }

    fn into_stored(self) -> StorageResult<StoredRecord> {
        let observed_at = parse_timestamp(&self.observed_at)?;
        let review_count = match self.review_count {
            Some(n) => Some(u64::try_from(n).map_err(|_| {
                StorageError::Malformed(format!("negative review count {} for {}", n, self.url))
            })?),
            None => None,
        };

        Ok(StoredRecord {
            id: self.id,
            record: Record {
                name: self.name,
                url: self.url,
                price: self.price,
                rating: self.rating,
                review_count,
                category: self.category,
                observed_at,
            },
            first_seen_at: self.first_seen_at,
        })
    }
}

impl RecordStore for SqliteStorage {
    fn save_records(&self, records: &[Record], category: &str) -> StorageResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(UPSERT_RECORD_SQL)?;
            for record in records {
                let review_count = record.review_count.and_then(|n| i64::try_from(n).ok());
                stmt.execute(params![
                    record.url,
                    record.name,
                    record.price,
                    record.rating,
                    review_count,
                    category,
                    format_timestamp(&record.observed_at),
                ])?;
            }
        }
        tx.commit()?;

        Ok(records.len())
    }

    fn recent_records(&self, limit: usize) -> StorageResult<Vec<StoredRecord>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY observed_at DESC, id DESC LIMIT ?1",
            SELECT_RECORD_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RecordRow::into_stored).collect()
    }

    fn count_records(&self) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_observed_since(&self, since: DateTime<Utc>) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE observed_at >= ?1",
            params![format_timestamp(&since)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn category_counts(&self) -> StorageResult<Vec<CategoryCount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT category, COUNT(*) FROM records GROUP BY category ORDER BY COUNT(*) DESC, category",
        )?;

        let counts = stmt
            .query_map([], |row| {
                Ok(CategoryCount {
                    category: row.get(0)?,
                    records: row.get::<_, i64>(1)? as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(url: &str, name: &str, category: &str, observed_at: DateTime<Utc>) -> Record {
        Record {
            name: name.to_string(),
            url: url.to_string(),
            price: Some("1,299".to_string()),
            rating: Some(4.3),
            review_count: Some(1523),
            category: category.to_string(),
            observed_at,
        }
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.count_records().unwrap(), 0);
    }

    #[test]
    fn test_save_and_read_back() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        let saved = storage
            .save_records(
                &[record("https://shop.test/dp/A1", "Kettle", "kitchen", now)],
                "kitchen",
            )
            .unwrap();
        assert_eq!(saved, 1);

        let recent = storage.recent_records(10).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].record.name, "Kettle");
        assert_eq!(recent[0].record.review_count, Some(1523));
        assert_eq!(recent[0].record.price.as_deref(), Some("1,299"));
    }

    #[test]
    fn test_upsert_refreshes_fields_but_keeps_category() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let earlier = Utc::now() - Duration::hours(2);
        let later = Utc::now();

        storage
            .save_records(
                &[record("https://shop.test/dp/A1", "Kettle", "kitchen", earlier)],
                "kitchen",
            )
            .unwrap();

        let mut updated = record("https://shop.test/dp/A1", "Kettle 1.5L", "deals", later);
        updated.price = None;
        storage.save_records(&[updated], "deals").unwrap();

        assert_eq!(storage.count_records().unwrap(), 1);
        let stored = &storage.recent_records(1).unwrap()[0];
        assert_eq!(stored.record.name, "Kettle 1.5L");
        assert_eq!(stored.record.price, None);
        assert_eq!(stored.record.category, "kitchen");
    }

    #[test]
    fn test_missing_fields_stay_missing() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let mut bare = record("https://shop.test/dp/B2", "Cable", "cables", Utc::now());
        bare.price = None;
        bare.rating = None;
        bare.review_count = None;

        storage.save_records(&[bare], "cables").unwrap();

        let stored = &storage.recent_records(1).unwrap()[0].record;
        assert_eq!(stored.price, None);
        assert_eq!(stored.rating, None);
        assert_eq!(stored.review_count, None);
    }

    #[test]
    fn test_count_observed_since() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        storage
            .save_records(
                &[
                    record("https://shop.test/dp/OLD", "Old", "misc", now - Duration::hours(3)),
                    record("https://shop.test/dp/NEW", "New", "misc", now),
                ],
                "misc",
            )
            .unwrap();

        let recent = storage
            .count_observed_since(now - Duration::hours(1))
            .unwrap();
        assert_eq!(recent, 1);
    }

    #[test]
    fn test_category_counts() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        let now = Utc::now();

        storage
            .save_records(
                &[
                    record("https://shop.test/dp/1", "One", "phones", now),
                    record("https://shop.test/dp/2", "Two", "phones", now),
                ],
                "phones",
            )
            .unwrap();
        storage
            .save_records(&[record("https://shop.test/dp/3", "Three", "books", now)], "books")
            .unwrap();

        let counts = storage.category_counts().unwrap();
        assert_eq!(counts[0].category, "phones");
        assert_eq!(counts[0].records, 2);
        assert_eq!(counts[1].category, "books");
    }

    #[test]
    fn test_open_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.db");

        let storage = SqliteStorage::open(&path).unwrap();
        storage
            .save_records(&[record("https://shop.test/dp/1", "One", "x", Utc::now())], "x")
            .unwrap();

        assert!(path.exists());
    }
}
