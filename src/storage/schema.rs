//! Database schema definitions
//!
//! Records are keyed by their canonical URL; re-harvesting a listing
//! refreshes the existing row instead of adding a new one.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per product listing
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    price TEXT,
    rating REAL,
    review_count INTEGER,
    category TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    observed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_category ON records(category);
CREATE INDEX IF NOT EXISTS idx_records_observed_at ON records(observed_at);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
