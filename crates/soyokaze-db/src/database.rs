use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use soyokaze_common::{Error, Result};
use soyokaze_config::DatabaseConfig;
use tracing::info;

use crate::journal_store::JournalStore;
use crate::migrations::{self, AppliedMigration, MIGRATIONS, MigrationReport, RollbackReport};
use crate::user_store::UserStore;

const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];

/// The journal database. Owns the only connection; stores borrow it.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database file and migrate it to the latest schema. Any failure
    /// here is fatal for the application.
    pub fn open(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        let db = Self::open_unmigrated(db_path, config)?;
        db.migrate().map_err(startup_error)?;
        Ok(db)
    }

    /// Open an existing database for inspection. Never creates files or
    /// directories and never writes; a missing file is an error.
    pub fn open_read_only(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        info!("opening database read-only at {}", db_path.display());
        if !db_path.is_file() {
            return Err(Error::Initialization(format!(
                "database not found at {}",
                db_path.display()
            )));
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags).map_err(|e| {
            Error::Initialization(format!(
                "failed to open {} read-only: {e}",
                db_path.display()
            ))
        })?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(|e| Error::Initialization(format!("failed to set busy timeout: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open without migrating, for tooling that inspects or rolls back.
    pub fn open_unmigrated(db_path: &Path, config: &DatabaseConfig) -> Result<Self> {
        info!("opening database at {}", db_path.display());
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Initialization(format!(
                    "failed to create {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| Error::Initialization(format!("failed to open database: {e}")))?;
        configure(&conn, config)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::Initialization(format!("failed to open in-memory database: {e}"))
        })?;
        configure(&conn, &DatabaseConfig::default())?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate().map_err(startup_error)?;
        Ok(db)
    }

    pub(crate) fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("database lock poisoned".into()))
    }

    pub fn migrate(&self) -> Result<MigrationReport> {
        let mut conn = self.connection()?;
        migrations::run_migrations(&mut conn)
    }

    pub fn rollback_to(&self, target: u32) -> Result<RollbackReport> {
        let mut conn = self.connection()?;
        migrations::rollback_to(&mut conn, MIGRATIONS, target)
    }

    pub fn current_version(&self) -> Result<u32> {
        let conn = self.connection()?;
        migrations::get_current_version(&conn)
    }

    pub fn applied_migrations(&self) -> Result<Vec<AppliedMigration>> {
        let conn = self.connection()?;
        migrations::applied_migrations(&conn)
    }

    pub fn users(&self) -> UserStore<'_> {
        UserStore::new(self)
    }

    pub fn journal(&self) -> JournalStore<'_> {
        JournalStore::new(self)
    }

    /// Close the connection, reporting errors that a plain drop would swallow.
    pub fn close(self) -> Result<()> {
        let conn = self
            .conn
            .into_inner()
            .map_err(|_| Error::Database("database lock poisoned".into()))?;
        conn.close()
            .map_err(|(_, e)| Error::Database(format!("failed to close database: {e}")))?;
        info!("database connection closed");
        Ok(())
    }
}

/// Any failure while migrating at open time aborts startup, whatever its kind.
fn startup_error(err: Error) -> Error {
    if err.is_fatal() {
        err
    } else {
        Error::Initialization(format!("startup migration failed: {err}"))
    }
}

fn configure(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
    let journal_mode = config.journal_mode.to_ascii_uppercase();
    if !JOURNAL_MODES.contains(&journal_mode.as_str()) {
        return Err(Error::Initialization(format!(
            "unsupported journal mode: {}",
            config.journal_mode
        )));
    }
    let foreign_keys = if config.foreign_keys { "ON" } else { "OFF" };

    conn.execute_batch(&format!(
        "PRAGMA journal_mode={journal_mode}; PRAGMA foreign_keys={foreign_keys};"
    ))
    .map_err(|e| Error::Initialization(format!("failed to set pragmas: {e}")))?;

    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|e| Error::Initialization(format!("failed to set busy timeout: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_database_is_fully_migrated() {
        let db = Database::in_memory().unwrap();
        assert_eq!(db.current_version().unwrap(), 2);

        let versions: Vec<u32> = db
            .applied_migrations()
            .unwrap()
            .into_iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(versions, vec![1, 2]);
    }

    #[test]
    fn migrate_again_is_noop() {
        let db = Database::in_memory().unwrap();
        let report = db.migrate().unwrap();
        assert!(report.is_noop());
        assert_eq!(report.from_version, 2);
    }

    #[test]
    fn rejects_unknown_journal_mode() {
        let conn = Connection::open_in_memory().unwrap();
        let config = DatabaseConfig {
            journal_mode: "wal; DROP TABLE users".into(),
            ..Default::default()
        };
        let err = configure(&conn, &config).unwrap_err();
        assert!(matches!(err, Error::Initialization(_)));
    }

    #[test]
    fn unreadable_tracking_table_fails_startup_as_fatal() {
        let err = startup_error(Error::Database("failed to read schema version".into()));
        assert!(matches!(err, Error::Initialization(_)));
        assert!(err.is_fatal());

        let err = startup_error(Error::InvalidRegistry("duplicate version 1".into()));
        assert!(matches!(err, Error::InvalidRegistry(_)));
    }

    #[test]
    fn close_releases_connection() {
        let db = Database::in_memory().unwrap();
        db.close().unwrap();
    }
}
