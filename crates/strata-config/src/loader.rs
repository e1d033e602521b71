use std::path::{Path, PathBuf};

use strata_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// File names looked up, in order, by [`ConfigLoader::discover`].
pub const CONFIG_FILE_NAMES: &[&str] = &["strata.yml", "strata.yaml", "strata.toml"];

pub struct ConfigLoader;

impl ConfigLoader {
    /// Parse a config file; the format follows the extension.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        let config = match extension(path) {
            "yml" | "yaml" => serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display())))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display())))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other:?}"
                )));
            }
        };

        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// First of [`CONFIG_FILE_NAMES`] present in `dir`.
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load `explicit` if given, else a discovered file in `dir`, else defaults.
    pub fn load_or_default(explicit: Option<&Path>, dir: &Path) -> Result<AppConfig> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::discover(dir) {
            Some(path) => Self::load(&path),
            None => {
                debug!("no config file in {}, using defaults", dir.display());
                Ok(AppConfig::default())
            }
        }
    }

    pub fn save(path: &Path, config: &AppConfig) -> Result<()> {
        let contents = match extension(path) {
            "yml" | "yaml" => serde_yaml::to_string(config)
                .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?,
            "toml" => toml::to_string_pretty(config)
                .map_err(|e| Error::Config(format!("failed to serialize config: {e}")))?,
            other => {
                return Err(Error::Config(format!(
                    "unsupported config extension: {other:?}"
                )));
            }
        };
        std::fs::write(path, contents)?;
        info!("config written to {}", path.display());
        Ok(())
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("")
}
