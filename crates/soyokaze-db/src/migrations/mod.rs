//! Versioned schema migrations for the journal database.
//!
//! Each migration has a version number, a name, and an ordered list of SQL
//! statements. Migrations are applied in ascending order, one transaction
//! each, and tracked in the `schema_migrations` table.

mod registry;
mod runner;
mod tracker;

use soyokaze_common::Error;

pub use registry::{latest_version, pending, validate_registry};
pub use runner::{MigrationReport, RollbackReport, rollback_to, run_migrations, run_migrations_with};
pub use tracker::{
    AppliedMigration, TRACKING_TABLE, applied_migrations, get_current_version, remove_version,
    set_version,
};

pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub up: &'static [&'static str],
    /// Reverse statements for manual rollback. Startup never runs these.
    pub down: Option<&'static [&'static str]>,
}

impl Migration {
    pub(crate) fn failure(&self, reason: impl Into<String>) -> Error {
        Error::Migration {
            version: self.version,
            name: self.name.to_string(),
            reason: reason.into(),
        }
    }
}

const INITIAL_SCHEMA_UP: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT UNIQUE NOT NULL,
        avatar_url TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        synced BOOLEAN DEFAULT 0,
        last_modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)",
    "CREATE INDEX IF NOT EXISTS idx_users_synced ON users(synced)",
    "CREATE TABLE IF NOT EXISTS journal_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        content TEXT NOT NULL,
        entry_date DATE NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        synced BOOLEAN DEFAULT 0,
        last_modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "CREATE INDEX IF NOT EXISTS idx_journal_entries_entry_date ON journal_entries(entry_date)",
    "CREATE INDEX IF NOT EXISTS idx_journal_entries_synced ON journal_entries(synced)",
];

const INITIAL_SCHEMA_DOWN: &[&str] = &[
    "DROP TABLE IF EXISTS journal_entries",
    "DROP TABLE IF EXISTS users",
];

const ADD_IMAGES_UP: &[&str] = &["ALTER TABLE journal_entries ADD COLUMN images TEXT"];

// SQLite can't portably drop a column, so the table is rebuilt.
const ADD_IMAGES_DOWN: &[&str] = &[
    "CREATE TABLE journal_entries_backup AS
        SELECT id, title, content, entry_date, created_at, updated_at, synced, last_modified
        FROM journal_entries",
    "DROP TABLE journal_entries",
    "CREATE TABLE journal_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        content TEXT NOT NULL,
        entry_date DATE NOT NULL,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        synced BOOLEAN DEFAULT 0,
        last_modified TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )",
    "INSERT INTO journal_entries
        (id, title, content, entry_date, created_at, updated_at, synced, last_modified)
        SELECT id, title, content, entry_date, created_at, updated_at, synced, last_modified
        FROM journal_entries_backup",
    "DROP TABLE journal_entries_backup",
    "CREATE INDEX IF NOT EXISTS idx_journal_entries_entry_date ON journal_entries(entry_date)",
    "CREATE INDEX IF NOT EXISTS idx_journal_entries_synced ON journal_entries(synced)",
];

/// The compiled-in registry, in ascending version order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        up: INITIAL_SCHEMA_UP,
        down: Some(INITIAL_SCHEMA_DOWN),
    },
    Migration {
        version: 2,
        name: "add_images_to_journal_entries",
        up: ADD_IMAGES_UP,
        down: Some(ADD_IMAGES_DOWN),
    },
];
