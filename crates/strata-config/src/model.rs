use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// SQL flavour used for the version table (`sqlite`, `postgres`, `mysql`).
    pub dialect: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db.sqlite"),
            dialect: "sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    pub dir: PathBuf,
    /// Name of the version table.
    pub table: String,
    /// Versions at or below this are never considered.
    pub min_version: i64,
    /// Versions above this are never considered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_version: Option<i64>,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("migrations"),
            table: "strata_db_version".to_string(),
            min_version: 0,
            max_version: None,
        }
    }
}

impl MigrationsConfig {
    pub fn max_version_or_unbounded(&self) -> i64 {
        self.max_version.unwrap_or(i64::MAX)
    }
}
