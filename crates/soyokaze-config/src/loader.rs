use std::path::{Path, PathBuf};

use soyokaze_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const CONFIG_FILE_NAMES: &[&str] = &["config.yml", "config.yaml", "config.toml"];

/// Locates and parses the Soyokaze configuration file.
pub struct ConfigLoader;

impl ConfigLoader {
    /// `~/.soyokaze`, or `./.soyokaze` when no home directory is known.
    pub fn default_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".soyokaze")
    }

    /// Parse a config file, choosing the format from its extension.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config = match ext {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error: {e}")))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other}"
                )));
            }
        };

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Load the first config file found in `config_dir`, or the defaults if
    /// there is none.
    pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
        for name in CONFIG_FILE_NAMES {
            let candidate = config_dir.join(name);
            if candidate.is_file() {
                return Self::load(&candidate);
            }
        }
        debug!(
            "no config file in {}, using defaults",
            config_dir.display()
        );
        Ok(AppConfig::default())
    }
}
