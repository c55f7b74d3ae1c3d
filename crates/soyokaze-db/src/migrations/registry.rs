use soyokaze_common::{Error, Result};

use super::Migration;

/// Highest version in the registry, or 0 when it is empty.
pub fn latest_version(registry: &[Migration]) -> u32 {
    registry.iter().map(|m| m.version).max().unwrap_or(0)
}

/// Reject registries the runner can't apply deterministically: zero or
/// repeated versions, versions out of ascending order, or migrations with
/// nothing to apply.
pub fn validate_registry(registry: &[Migration]) -> Result<()> {
    let mut previous: Option<&Migration> = None;
    for migration in registry {
        if migration.version == 0 {
            return Err(Error::InvalidRegistry(format!(
                "migration {} has version 0; versions start at 1",
                migration.name
            )));
        }
        if migration.up.is_empty() {
            return Err(Error::InvalidRegistry(format!(
                "migration {} ({}) has no statements",
                migration.version, migration.name
            )));
        }
        if let Some(prev) = previous {
            if migration.version == prev.version {
                return Err(Error::InvalidRegistry(format!(
                    "duplicate version {} ({} and {})",
                    migration.version, prev.name, migration.name
                )));
            }
            if migration.version < prev.version {
                return Err(Error::InvalidRegistry(format!(
                    "version {} ({}) is declared after version {} ({})",
                    migration.version, migration.name, prev.version, prev.name
                )));
            }
        }
        previous = Some(migration);
    }
    Ok(())
}

/// Migrations newer than `current`, in ascending order. Assumes a validated
/// registry.
pub fn pending(registry: &[Migration], current: u32) -> Vec<&Migration> {
    registry.iter().filter(|m| m.version > current).collect()
}
