use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use strata_common::{Error, Result};
use tracing::debug;

use crate::dialect::{self, Dialect};
use crate::handle::{DatabaseHandle, SqlValue};

pub const DEFAULT_TABLE: &str = "strata_db_version";

static TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$").expect("valid regex")
});

/// Where the ledger lives. The table name is spliced into SQL, so only plain
/// (optionally schema-qualified) identifiers are accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    table: String,
}

impl LedgerConfig {
    pub fn new(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !TABLE_NAME.is_match(&table) {
            return Err(Error::Config(format!("invalid version table name: {table:?}")));
        }
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

/// One applied row of the version table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub version: i64,
    pub is_applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
}

/// Persisted history of applied migration versions.
///
/// Every read goes to the database; nothing is cached between calls.
pub struct VersionLedger {
    config: LedgerConfig,
    dialect: Box<dyn Dialect>,
}

impl VersionLedger {
    pub fn new(config: LedgerConfig, dialect: Box<dyn Dialect>) -> Self {
        Self { config, dialect }
    }

    /// Default table name with the SQLite dialect.
    pub fn sqlite() -> Self {
        Self::new(LedgerConfig::default(), Box::new(dialect::Sqlite))
    }

    pub fn table(&self) -> &str {
        self.config.table()
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Create the version table if it does not exist yet.
    pub fn ensure(&self, db: &mut dyn DatabaseHandle) -> Result<()> {
        db.execute_batch(&self.dialect.create_version_table_sql(self.table()))
            .map_err(|e| {
                Error::Ledger(format!("failed to create {}: {}", self.table(), cause(e)))
            })
    }

    /// Highest applied version, `0` when nothing has been applied.
    pub fn current_version(&self, db: &mut dyn DatabaseHandle) -> Result<i64> {
        self.ensure(db)?;
        let rows = db
            .query(&self.dialect.current_version_sql(self.table()), &[])
            .map_err(|e| Error::Ledger(format!("failed to read current version: {}", cause(e))))?;

        let version = match rows.first().and_then(|row| row.first()) {
            None | Some(SqlValue::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| {
                Error::Ledger(format!("unexpected current version value: {value:?}"))
            })?,
        };
        debug!("current version in {}: {version}", self.table());
        Ok(version)
    }

    /// Every applied version, gaps included.
    pub fn all_applied(&self, db: &mut dyn DatabaseHandle) -> Result<BTreeSet<i64>> {
        self.ensure(db)?;
        let rows = db
            .query(&self.dialect.applied_versions_sql(self.table()), &[])
            .map_err(|e| {
                Error::Ledger(format!("failed to read applied versions: {}", cause(e)))
            })?;

        let mut applied = BTreeSet::new();
        for row in rows {
            applied.insert(read_version(&row)?);
        }
        debug!("{} applied version(s) in {}", applied.len(), self.table());
        Ok(applied)
    }

    pub fn is_applied(&self, db: &mut dyn DatabaseHandle, version: i64) -> Result<bool> {
        Ok(self.all_applied(db)?.contains(&version))
    }

    /// Applied rows in the order they were written.
    pub fn records(&self, db: &mut dyn DatabaseHandle) -> Result<Vec<VersionRecord>> {
        self.ensure(db)?;
        let rows = db
            .query(&self.dialect.applied_records_sql(self.table()), &[])
            .map_err(|e| Error::Ledger(format!("failed to read version rows: {}", cause(e))))?;

        rows.iter()
            .map(|row| {
                Ok(VersionRecord {
                    version: read_version(row)?,
                    is_applied: true,
                    applied_at: row.get(1).and_then(SqlValue::as_str).and_then(parse_datetime),
                })
            })
            .collect()
    }

    /// Insert the row marking `version` applied. Callers run this inside the
    /// migration's transaction when it has one.
    pub fn record_applied(&self, db: &mut dyn DatabaseHandle, version: i64) -> Result<()> {
        let tstamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        db.execute(
            &self.dialect.insert_version_sql(self.table()),
            &[
                SqlValue::Integer(version),
                SqlValue::Bool(true),
                SqlValue::Text(tstamp),
            ],
        )
        .map_err(|e| Error::Ledger(format!("failed to record version {version}: {}", cause(e))))?;
        debug!("recorded version {version} in {}", self.table());
        Ok(())
    }
}

fn read_version(row: &[SqlValue]) -> Result<i64> {
    row.first()
        .and_then(SqlValue::as_i64)
        .ok_or_else(|| Error::Ledger(format!("unexpected version_id value: {row:?}")))
}

/// Strip the `database error:` prefix so ledger messages read cleanly.
fn cause(e: Error) -> String {
    match e {
        Error::Database(msg) => msg,
        other => other.to_string(),
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // SQLite datetime('now') produces "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| naive.and_utc())
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteHandle;

    #[test]
    fn fresh_database_is_at_version_zero() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::sqlite();
        assert_eq!(ledger.current_version(&mut db).unwrap(), 0);
        assert!(ledger.all_applied(&mut db).unwrap().is_empty());
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::sqlite();
        ledger.ensure(&mut db).unwrap();
        ledger.record_applied(&mut db, 4).unwrap();
        ledger.ensure(&mut db).unwrap();
        assert_eq!(ledger.current_version(&mut db).unwrap(), 4);
    }

    #[test]
    fn current_version_is_the_maximum_not_the_latest() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::sqlite();
        ledger.ensure(&mut db).unwrap();
        ledger.record_applied(&mut db, 3).unwrap();
        ledger.record_applied(&mut db, 1).unwrap();

        assert_eq!(ledger.current_version(&mut db).unwrap(), 3);
        assert_eq!(
            ledger.all_applied(&mut db).unwrap().into_iter().collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert!(ledger.is_applied(&mut db, 1).unwrap());
        assert!(!ledger.is_applied(&mut db, 2).unwrap());
    }

    #[test]
    fn records_keep_insertion_order_and_timestamps() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::sqlite();
        ledger.ensure(&mut db).unwrap();
        ledger.record_applied(&mut db, 10).unwrap();
        ledger.record_applied(&mut db, 5).unwrap();

        let records = ledger.records(&mut db).unwrap();
        let versions: Vec<_> = records.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![10, 5]);
        assert!(records.iter().all(|r| r.is_applied && r.applied_at.is_some()));
    }

    #[test]
    fn unapplied_rows_are_ignored() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::sqlite();
        ledger.ensure(&mut db).unwrap();
        ledger.record_applied(&mut db, 1).unwrap();
        db.execute_batch(
            "INSERT INTO strata_db_version (version_id, is_applied) VALUES (9, 0)",
        )
        .unwrap();

        assert_eq!(ledger.current_version(&mut db).unwrap(), 1);
        assert!(!ledger.all_applied(&mut db).unwrap().contains(&9));
    }

    #[test]
    fn custom_table_name_is_used() {
        let mut db = SqliteHandle::in_memory().unwrap();
        let ledger = VersionLedger::new(
            LedgerConfig::new("schema_history").unwrap(),
            Box::new(dialect::Sqlite),
        );
        ledger.ensure(&mut db).unwrap();
        ledger.record_applied(&mut db, 2).unwrap();

        let count: i64 = db
            .connection()
            .query_row("SELECT COUNT(*) FROM schema_history", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn table_names_are_validated() {
        assert!(LedgerConfig::new("versions").is_ok());
        assert!(LedgerConfig::new("public.versions").is_ok());
        assert!(LedgerConfig::new("").is_err());
        assert!(LedgerConfig::new("versions; DROP TABLE users").is_err());
        assert!(LedgerConfig::new("1versions").is_err());
    }

    #[test]
    fn query_failures_map_to_ledger_error() {
        let mut db = SqliteHandle::in_memory().unwrap();
        db.execute_batch("CREATE TABLE strata_db_version (unrelated TEXT)")
            .unwrap();
        let err = VersionLedger::sqlite().current_version(&mut db).unwrap_err();
        assert!(matches!(err, Error::Ledger(_)), "got {err:?}");
    }

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        assert!(parse_datetime("2024-01-02 03:04:05").is_some());
        assert!(parse_datetime("2024-01-02T03:04:05Z").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }
}
