use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use soyokaze_common::{Error, Result};

use crate::sql::datetime_column;

pub const TRACKING_TABLE: &str = "schema_migrations";

/// One row of the version-tracking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedMigration {
    pub version: u32,
    pub applied_at: DateTime<Utc>,
}

fn tracking_table_exists(conn: &Connection) -> Result<bool> {
    conn.query_row(
        "SELECT count(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![TRACKING_TABLE],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to inspect schema: {e}")))
}

/// Highest applied version. A missing or empty tracking table means a fresh
/// database and yields 0.
pub fn get_current_version(conn: &Connection) -> Result<u32> {
    if !tracking_table_exists(conn)? {
        return Ok(0);
    }
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| Error::Database(format!("failed to read schema version: {e}")))
}

/// Record `version` as applied, creating the tracking table on first use.
/// Call only after the migration's statements have all succeeded, inside the
/// same transaction.
pub fn set_version(conn: &Connection, version: u32) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    )
    .map_err(|e| Error::Database(format!("failed to create schema_migrations: {e}")))?;

    conn.execute(
        "INSERT OR REPLACE INTO schema_migrations (version) VALUES (?1)",
        params![version],
    )
    .map_err(|e| Error::Database(format!("failed to record version {version}: {e}")))?;
    Ok(())
}

/// Forget that `version` was applied. Used only by rollback.
pub fn remove_version(conn: &Connection, version: u32) -> Result<()> {
    if !tracking_table_exists(conn)? {
        return Ok(());
    }
    conn.execute(
        "DELETE FROM schema_migrations WHERE version = ?1",
        params![version],
    )
    .map_err(|e| Error::Database(format!("failed to remove version {version}: {e}")))?;
    Ok(())
}

/// Every applied version, oldest first.
pub fn applied_migrations(conn: &Connection) -> Result<Vec<AppliedMigration>> {
    if !tracking_table_exists(conn)? {
        return Ok(Vec::new());
    }
    let mut stmt = conn
        .prepare("SELECT version, applied_at FROM schema_migrations ORDER BY version ASC")
        .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(AppliedMigration {
                version: row.get(0)?,
                applied_at: datetime_column(row, 1)?,
            })
        })
        .map_err(|e| Error::Database(format!("failed to query schema_migrations: {e}")))?;

    let mut applied = Vec::new();
    for row in rows {
        applied.push(
            row.map_err(|e| Error::Database(format!("failed to read schema_migrations row: {e}")))?,
        );
    }
    Ok(applied)
}
