use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strata_common::{Error, Result};

use crate::handle::DatabaseHandle;

/// The work a migration performs when applied.
pub trait MigrationAction: Send + Sync {
    fn apply(&self, db: &mut dyn DatabaseHandle) -> Result<()>;
}

impl<F> MigrationAction for F
where
    F: Fn(&mut dyn DatabaseHandle) -> Result<()> + Send + Sync,
{
    fn apply(&self, db: &mut dyn DatabaseHandle) -> Result<()> {
        self(db)
    }
}

/// A plain SQL body executed as one batch.
#[derive(Debug, Clone)]
pub struct SqlScript {
    sql: String,
}

impl SqlScript {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into() }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }
}

impl MigrationAction for SqlScript {
    fn apply(&self, db: &mut dyn DatabaseHandle) -> Result<()> {
        if self.sql.trim().is_empty() {
            return Ok(());
        }
        db.execute_batch(&self.sql)
    }
}

/// Where a migration definition came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    File(PathBuf),
    Code,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File(path) => write!(f, "{}", path.display()),
            Origin::Code => f.write_str("<registered in code>"),
        }
    }
}

/// A single versioned schema change. Immutable once built.
#[derive(Clone)]
pub struct Migration {
    version: i64,
    name: String,
    transactional: bool,
    origin: Origin,
    action: Arc<dyn MigrationAction>,
}

impl Migration {
    pub fn new(version: i64, name: impl Into<String>, action: impl MigrationAction + 'static) -> Self {
        Self {
            version,
            name: name.into(),
            transactional: true,
            origin: Origin::Code,
            action: Arc::new(action),
        }
    }

    pub fn from_sql(version: i64, name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self::new(version, name, SqlScript::new(sql))
    }

    pub fn from_fn<F>(version: i64, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut dyn DatabaseHandle) -> Result<()> + Send + Sync + 'static,
    {
        Self::new(version, name, f)
    }

    /// Run this migration outside of a transaction. Needed for statements
    /// some databases refuse inside one (e.g. `CREATE INDEX CONCURRENTLY`).
    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = origin;
        self
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn source_path(&self) -> Option<&Path> {
        match &self.origin {
            Origin::File(path) => Some(path),
            Origin::Code => None,
        }
    }

    /// Run the migration body. Transaction handling is the caller's job.
    pub fn apply(&self, db: &mut dyn DatabaseHandle) -> Result<()> {
        self.action.apply(db)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("transactional", &self.transactional)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.version, self.name)
    }
}

/// Migrations sorted ascending by version, no two sharing a version.
#[derive(Debug, Clone, Default)]
pub struct MigrationList {
    migrations: Vec<Migration>,
}

impl MigrationList {
    /// Validate and sort. Rejects non-positive versions, since `0` means
    /// "nothing applied yet", and any duplicated version.
    pub fn new(migrations: Vec<Migration>) -> Result<Self> {
        let mut by_version: BTreeMap<i64, Migration> = BTreeMap::new();
        for migration in migrations {
            if migration.version() < 1 {
                return Err(Error::Load(format!(
                    "migration versions must be greater than zero: {} in {}",
                    migration.version(),
                    migration.origin()
                )));
            }
            if let Some(existing) = by_version.get(&migration.version()) {
                return Err(Error::Load(format!(
                    "duplicate migration version {}: {} and {}",
                    migration.version(),
                    existing.origin(),
                    migration.origin()
                )));
            }
            by_version.insert(migration.version(), migration);
        }

        Ok(Self {
            migrations: by_version.into_values().collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    pub fn as_slice(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn get(&self, version: i64) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, Migration::version)
            .ok()
            .map(|i| &self.migrations[i])
    }

    pub fn versions(&self) -> Vec<i64> {
        self.migrations.iter().map(Migration::version).collect()
    }

    pub fn first(&self) -> Option<&Migration> {
        self.migrations.first()
    }

    pub fn last(&self) -> Option<&Migration> {
        self.migrations.last()
    }

    /// The subset with `min < version <= max`, order preserved.
    pub fn bounded(&self, min: i64, max: i64) -> MigrationList {
        MigrationList {
            migrations: self
                .migrations
                .iter()
                .filter(|m| m.version() > min && m.version() <= max)
                .cloned()
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a MigrationList {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(version: i64) -> Migration {
        Migration::from_sql(version, format!("m{version}"), "")
    }

    #[test]
    fn list_is_sorted_ascending() {
        let list = MigrationList::new(vec![noop(30), noop(10), noop(20)]).unwrap();
        assert_eq!(list.versions(), vec![10, 20, 30]);
        assert_eq!(list.first().map(Migration::version), Some(10));
        assert_eq!(list.last().map(Migration::version), Some(30));
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let a = noop(2).with_origin(Origin::File("2_a.sql".into()));
        let b = noop(2).with_origin(Origin::File("2_b.sql".into()));
        let err = MigrationList::new(vec![noop(1), a, b]).unwrap_err();
        match err {
            Error::Load(msg) => {
                assert!(msg.contains("duplicate migration version 2"), "{msg}");
                assert!(msg.contains("2_a.sql") && msg.contains("2_b.sql"), "{msg}");
            }
            other => panic!("expected Load error, got {other:?}"),
        }
    }

    #[test]
    fn non_positive_versions_are_rejected() {
        assert!(matches!(
            MigrationList::new(vec![noop(0)]),
            Err(Error::Load(_))
        ));
        assert!(matches!(
            MigrationList::new(vec![noop(-4)]),
            Err(Error::Load(_))
        ));
    }

    #[test]
    fn bounded_is_exclusive_below_and_inclusive_above() {
        let list = MigrationList::new((1..=5).map(noop).collect()).unwrap();
        assert_eq!(list.bounded(1, 4).versions(), vec![2, 3, 4]);
        assert_eq!(list.bounded(0, i64::MAX).versions(), vec![1, 2, 3, 4, 5]);
        assert!(list.bounded(5, 10).is_empty());
    }

    #[test]
    fn get_finds_by_version() {
        let list = MigrationList::new(vec![noop(3), noop(8)]).unwrap();
        assert_eq!(list.get(8).map(Migration::name), Some("m8"));
        assert!(list.get(5).is_none());
    }

    #[test]
    fn builder_flags_are_kept() {
        let m = noop(1).without_transaction();
        assert!(!m.is_transactional());
        assert_eq!(m.origin(), &Origin::Code);
        assert!(m.source_path().is_none());
        assert_eq!(m.to_string(), "1 (m1)");
    }
}
