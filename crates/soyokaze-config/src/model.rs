use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File name of the journal database inside the config directory.
pub const DATABASE_FILE_NAME: &str = "soyokaze.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Explicit database file. Defaults to `soyokaze.db` in the config directory.
    pub path: Option<PathBuf>,
    pub journal_mode: String,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            journal_mode: "WAL".to_string(),
            foreign_keys: true,
            busy_timeout_ms: 5000,
        }
    }
}

impl DatabaseConfig {
    pub fn resolve_path(&self, config_dir: &Path) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| config_dir.join(DATABASE_FILE_NAME))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
