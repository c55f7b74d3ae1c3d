pub mod database;
pub mod image_store;
pub mod journal_store;
pub mod migrations;
pub mod user_store;
mod sql;
mod validation;

pub use database::Database;
pub use image_store::{IMAGES_DIR_NAME, ImageStore};
pub use journal_store::{JournalEntry, JournalEntryUpdate, JournalStore, NewJournalEntry};
pub use migrations::{
    AppliedMigration, MIGRATIONS, Migration, MigrationReport, RollbackReport, get_current_version,
    rollback_to, run_migrations, run_migrations_with, set_version,
};
pub use user_store::{NewUser, User, UserStore, UserUpdate};
