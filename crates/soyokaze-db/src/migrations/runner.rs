use rusqlite::Connection;
use serde::Serialize;
use soyokaze_common::{Error, Result};
use tracing::{error, info, warn};

use super::registry::{pending, validate_registry};
use super::tracker::{applied_migrations, get_current_version, remove_version, set_version};
use super::{MIGRATIONS, Migration};

/// Outcome of a forward migration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Versions applied by this run, ascending. Empty when already current.
    pub applied: Vec<u32>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Outcome of a manual rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Versions reverted, descending.
    pub reverted: Vec<u32>,
}

/// Bring `conn` up to the latest built-in schema version.
pub fn run_migrations(conn: &mut Connection) -> Result<MigrationReport> {
    run_migrations_with(conn, MIGRATIONS)
}

/// Apply every migration in `registry` newer than the recorded version, in
/// order, one transaction each. Stops at the first failure, leaving the
/// database at the last committed version.
pub fn run_migrations_with(
    conn: &mut Connection,
    registry: &[Migration],
) -> Result<MigrationReport> {
    validate_registry(registry)?;

    let current = get_current_version(conn)?;
    info!("current database version: {current}");

    let pending = pending(registry, current);
    if pending.is_empty() {
        info!("no pending migrations");
        return Ok(MigrationReport {
            from_version: current,
            to_version: current,
            applied: Vec::new(),
        });
    }

    info!("running {} migrations", pending.len());
    let mut applied = Vec::with_capacity(pending.len());
    for migration in pending {
        info!(
            "applying migration {}: {}",
            migration.version, migration.name
        );
        if let Err(e) = apply(conn, migration) {
            error!(
                version = migration.version,
                name = migration.name,
                "migration failed: {e}"
            );
            return Err(e);
        }
        info!("migration {} applied successfully", migration.version);
        applied.push(migration.version);
    }

    let to_version = applied.last().copied().unwrap_or(current);
    info!("all migrations completed, database at version {to_version}");
    Ok(MigrationReport {
        from_version: current,
        to_version,
        applied,
    })
}

fn apply(conn: &mut Connection, migration: &Migration) -> Result<()> {
    // Dropping `tx` without commit rolls everything back.
    let tx = conn
        .transaction()
        .map_err(|e| migration.failure(format!("failed to begin transaction: {e}")))?;

    for statement in migration.up {
        tx.execute_batch(statement)
            .map_err(|e| migration.failure(e.to_string()))?;
    }
    set_version(&tx, migration.version).map_err(|e| migration.failure(e.to_string()))?;

    tx.commit()
        .map_err(|e| migration.failure(format!("commit failed: {e}")))
}

/// Revert applied migrations newer than `target`, newest first, using their
/// `down` statements. Refuses to start if any of them is irreversible.
pub fn rollback_to(
    conn: &mut Connection,
    registry: &[Migration],
    target: u32,
) -> Result<RollbackReport> {
    validate_registry(registry)?;

    let current = get_current_version(conn)?;
    if target >= current {
        info!("database at version {current}, nothing to roll back to {target}");
        return Ok(RollbackReport {
            from_version: current,
            to_version: current,
            reverted: Vec::new(),
        });
    }

    let mut steps = Vec::new();
    for applied in applied_migrations(conn)?.iter().rev() {
        if applied.version <= target {
            break;
        }
        let migration = registry
            .iter()
            .find(|m| m.version == applied.version)
            .ok_or_else(|| {
                Error::InvalidRegistry(format!(
                    "applied version {} is not in the registry",
                    applied.version
                ))
            })?;
        let down = migration
            .down
            .ok_or_else(|| migration.failure("irreversible: no down statements"))?;
        steps.push((migration, down));
    }

    let mut reverted = Vec::with_capacity(steps.len());
    for (migration, down) in steps {
        warn!(
            "reverting migration {}: {}",
            migration.version, migration.name
        );
        if let Err(e) = revert(conn, migration, down) {
            error!(
                version = migration.version,
                name = migration.name,
                "rollback failed: {e}"
            );
            return Err(e);
        }
        reverted.push(migration.version);
    }

    let to_version = get_current_version(conn)?;
    info!("rollback complete, database at version {to_version}");
    Ok(RollbackReport {
        from_version: current,
        to_version,
        reverted,
    })
}

fn revert(conn: &mut Connection, migration: &Migration, down: &[&str]) -> Result<()> {
    let tx = conn
        .transaction()
        .map_err(|e| migration.failure(format!("failed to begin transaction: {e}")))?;

    for statement in down {
        tx.execute_batch(statement)
            .map_err(|e| migration.failure(e.to_string()))?;
    }
    remove_version(&tx, migration.version).map_err(|e| migration.failure(e.to_string()))?;

    tx.commit()
        .map_err(|e| migration.failure(format!("commit failed: {e}")))
}
