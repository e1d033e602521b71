//! SQL used to manage the version table, per database flavour.
//!
//! The table name is always passed in already validated by
//! [`LedgerConfig`](crate::ledger::LedgerConfig); dialects interpolate it as-is.

use strata_common::{Error, Result};

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Idempotent `CREATE TABLE IF NOT EXISTS` for the version table.
    fn create_version_table_sql(&self, table: &str) -> String;

    /// Single row, single column: highest applied version or NULL.
    fn current_version_sql(&self, table: &str) -> String;

    /// One `version_id` per applied row.
    fn applied_versions_sql(&self, table: &str) -> String;

    /// `version_id, tstamp` for every applied row in insertion order.
    fn applied_records_sql(&self, table: &str) -> String;

    /// Insert with three parameters: version_id, is_applied, tstamp.
    fn insert_version_sql(&self, table: &str) -> String;
}

pub struct Sqlite;

impl Dialect for Sqlite {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                version_id INTEGER NOT NULL,
                is_applied INTEGER NOT NULL,
                tstamp TIMESTAMP DEFAULT (datetime('now'))
            )"
        )
    }

    fn current_version_sql(&self, table: &str) -> String {
        format!("SELECT MAX(version_id) FROM {table} WHERE is_applied")
    }

    fn applied_versions_sql(&self, table: &str) -> String {
        format!("SELECT version_id FROM {table} WHERE is_applied")
    }

    fn applied_records_sql(&self, table: &str) -> String {
        format!("SELECT version_id, tstamp FROM {table} WHERE is_applied ORDER BY id ASC")
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied, tstamp) VALUES (?1, ?2, ?3)")
    }
}

pub struct Postgres;

impl Dialect for Postgres {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            )"
        )
    }

    fn current_version_sql(&self, table: &str) -> String {
        format!("SELECT MAX(version_id) FROM {table} WHERE is_applied")
    }

    fn applied_versions_sql(&self, table: &str) -> String {
        format!("SELECT version_id FROM {table} WHERE is_applied")
    }

    fn applied_records_sql(&self, table: &str) -> String {
        format!("SELECT version_id, tstamp FROM {table} WHERE is_applied ORDER BY id ASC")
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied, tstamp) VALUES ($1, $2, $3)")
    }
}

pub struct MySql;

impl Dialect for MySql {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn create_version_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id serial NOT NULL,
                version_id bigint NOT NULL,
                is_applied boolean NOT NULL,
                tstamp timestamp NULL default now(),
                PRIMARY KEY(id)
            )"
        )
    }

    fn current_version_sql(&self, table: &str) -> String {
        format!("SELECT MAX(version_id) FROM {table} WHERE is_applied")
    }

    fn applied_versions_sql(&self, table: &str) -> String {
        format!("SELECT version_id FROM {table} WHERE is_applied")
    }

    fn applied_records_sql(&self, table: &str) -> String {
        format!("SELECT version_id, tstamp FROM {table} WHERE is_applied ORDER BY id ASC")
    }

    fn insert_version_sql(&self, table: &str) -> String {
        format!("INSERT INTO {table} (version_id, is_applied, tstamp) VALUES (?, ?, ?)")
    }
}

/// Resolve a dialect from its configured name.
pub fn by_name(name: &str) -> Result<Box<dyn Dialect>> {
    match name.to_ascii_lowercase().as_str() {
        "sqlite" | "sqlite3" => Ok(Box::new(Sqlite)),
        "postgres" | "postgresql" => Ok(Box::new(Postgres)),
        "mysql" => Ok(Box::new(MySql)),
        other => Err(Error::Config(format!("unsupported dialect: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_names_case_insensitively() {
        assert_eq!(by_name("sqlite3").unwrap().name(), "sqlite");
        assert_eq!(by_name("PostgreSQL").unwrap().name(), "postgres");
        assert_eq!(by_name("mysql").unwrap().name(), "mysql");
    }

    #[test]
    fn unknown_dialect_is_config_error() {
        let err = by_name("oracle").err().expect("oracle is not supported");
        assert_eq!(err.to_string(), "configuration error: unsupported dialect: oracle");
    }

    #[test]
    fn placeholders_follow_dialect() {
        assert!(Sqlite.insert_version_sql("v").ends_with("VALUES (?1, ?2, ?3)"));
        assert!(Postgres.insert_version_sql("v").ends_with("VALUES ($1, $2, $3)"));
        assert!(MySql.insert_version_sql("v").ends_with("VALUES (?, ?, ?)"));
    }

    #[test]
    fn table_name_is_interpolated() {
        let sql = Postgres.current_version_sql("public.schema_versions");
        assert_eq!(
            sql,
            "SELECT MAX(version_id) FROM public.schema_versions WHERE is_applied"
        );
        assert!(
            Sqlite
                .create_version_table_sql("my_versions")
                .starts_with("CREATE TABLE IF NOT EXISTS my_versions")
        );
    }
}
