use std::path::Path;

use anyhow::Result;
use serde_json::json;
use soyokaze_db::{AppliedMigration, Migration, MigrationReport, RollbackReport};

pub struct Status<'a> {
    pub database: &'a Path,
    pub current_version: u32,
    pub latest_version: u32,
    pub applied: &'a [AppliedMigration],
    pub pending: &'a [&'a Migration],
}

pub fn print_migration(report: &MigrationReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.is_noop() {
        println!("Database is up to date (version {}).", report.to_version);
    } else {
        println!(
            "Migrated from version {} to {} (applied: {}).",
            report.from_version,
            report.to_version,
            join_versions(&report.applied)
        );
    }
    Ok(())
}

pub fn print_rollback(report: &RollbackReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if report.reverted.is_empty() {
        println!("Nothing to roll back (version {}).", report.to_version);
    } else {
        println!(
            "Rolled back from version {} to {} (reverted: {}).",
            report.from_version,
            report.to_version,
            join_versions(&report.reverted)
        );
    }
    Ok(())
}

pub fn print_status(status: &Status<'_>, as_json: bool) -> Result<()> {
    if as_json {
        let pending: Vec<_> = status
            .pending
            .iter()
            .map(|m| json!({ "version": m.version, "name": m.name }))
            .collect();
        let value = json!({
            "database": status.database.display().to_string(),
            "current_version": status.current_version,
            "latest_version": status.latest_version,
            "applied": status.applied,
            "pending": pending,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("  Database:        {}", status.database.display());
    println!(
        "  Schema version:  {} (latest {})",
        status.current_version, status.latest_version
    );
    println!();
    if status.applied.is_empty() {
        println!("  Applied:         none");
    } else {
        println!("  Applied:");
        for applied in status.applied {
            println!(
                "    {:>4}  {}",
                applied.version,
                applied.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    if status.pending.is_empty() {
        println!("  Pending:         none");
    } else {
        println!("  Pending:");
        for migration in status.pending {
            println!("    {:>4}  {}", migration.version, migration.name);
        }
    }
    Ok(())
}

fn join_versions(versions: &[u32]) -> String {
    versions
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::join_versions;

    #[test]
    fn versions_are_comma_separated() {
        assert_eq!(join_versions(&[1, 2, 3]), "1, 2, 3");
        assert_eq!(join_versions(&[]), "");
    }
}
