use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use strata_common::{Error, Result};
use tracing::{debug, error, info, warn};

use crate::handle::DatabaseHandle;
use crate::ledger::{VersionLedger, VersionRecord};
use crate::migration::{Migration, MigrationList};
use crate::sequencer;

/// Version window every mode works within: `min_version < v <= max_version`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigratorOptions {
    pub min_version: i64,
    pub max_version: i64,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            min_version: 0,
            max_version: i64::MAX,
        }
    }
}

/// Outcome of one run. An empty `applied` list is the "nothing to run" case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub applied: Vec<i64>,
    pub current_version: i64,
}

impl RunReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationState {
    Applied { at: Option<DateTime<Utc>> },
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub version: i64,
    pub name: String,
    pub state: MigrationState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub current_version: i64,
    pub entries: Vec<StatusEntry>,
    /// Applied rows with no matching migration definition.
    pub orphaned: Vec<VersionRecord>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &StatusEntry> {
        self.entries
            .iter()
            .filter(|e| e.state == MigrationState::Pending)
    }
}

/// Applies migrations against a database and keeps the ledger in step.
///
/// One migration is in flight at a time. Each transactional migration and
/// its ledger row commit together, so a failure leaves the ledger exactly as
/// it was before that migration started.
pub struct Migrator {
    ledger: VersionLedger,
    options: MigratorOptions,
}

impl Migrator {
    pub fn new(ledger: VersionLedger, options: MigratorOptions) -> Self {
        Self { ledger, options }
    }

    pub fn sqlite() -> Self {
        Self::new(VersionLedger::sqlite(), MigratorOptions::default())
    }

    pub fn ledger(&self) -> &VersionLedger {
        &self.ledger
    }

    pub fn options(&self) -> MigratorOptions {
        self.options
    }

    pub fn version(&self, db: &mut dyn DatabaseHandle) -> Result<i64> {
        self.ledger.current_version(db)
    }

    /// Apply the single next migration above the current version.
    pub fn apply_next(
        &self,
        db: &mut dyn DatabaseHandle,
        migrations: &MigrationList,
    ) -> Result<RunReport> {
        let candidates = self.candidates(migrations, self.options.max_version);
        let current = self.ledger.current_version(db)?;

        let Some(migration) = sequencer::next(&candidates, current) else {
            info!("no migrations to run. current version: {current}");
            return Ok(RunReport {
                applied: Vec::new(),
                current_version: current,
            });
        };

        self.apply_one(db, migration)?;
        Ok(RunReport {
            applied: vec![migration.version()],
            current_version: self.ledger.current_version(db)?,
        })
    }

    /// Apply migrations one at a time, in order, until none at or below
    /// `target` remain above the current version.
    ///
    /// The current version is read from the ledger before every step.
    pub fn apply_up_to(
        &self,
        db: &mut dyn DatabaseHandle,
        migrations: &MigrationList,
        target: i64,
    ) -> Result<RunReport> {
        let candidates = self.candidates(migrations, target);
        let mut applied = Vec::new();

        loop {
            let current = self.ledger.current_version(db)?;
            let Some(migration) = sequencer::next(&candidates, current) else {
                if applied.is_empty() {
                    info!("no migrations to run. current version: {current}");
                } else {
                    info!(
                        "applied {} migration(s), now at version {current}",
                        applied.len()
                    );
                }
                return Ok(RunReport {
                    applied,
                    current_version: current,
                });
            };

            if applied.contains(&migration.version()) {
                return Err(Error::Ledger(format!(
                    "version {} was applied but the ledger still reports {current}",
                    migration.version()
                )));
            }

            self.apply_one(db, migration)?;
            applied.push(migration.version());
        }
    }

    /// Apply everything available.
    pub fn apply_all(
        &self,
        db: &mut dyn DatabaseHandle,
        migrations: &MigrationList,
    ) -> Result<RunReport> {
        self.apply_up_to(db, migrations, self.options.max_version)
    }

    /// Apply every migration missing from the ledger, lower versions first,
    /// including ones below the current version.
    ///
    /// The applied set is read once up front; unlike the other modes this
    /// fills gaps instead of only moving the high-water mark.
    pub fn apply_all_unapplied(
        &self,
        db: &mut dyn DatabaseHandle,
        migrations: &MigrationList,
    ) -> Result<RunReport> {
        let candidates = self.candidates(migrations, self.options.max_version);
        let already = self.ledger.all_applied(db)?;

        let mut applied = Vec::new();
        for migration in sequencer::unapplied(&candidates, &already) {
            self.apply_one(db, migration)?;
            applied.push(migration.version());
        }

        let current = self.ledger.current_version(db)?;
        if applied.is_empty() {
            info!("no migrations to run. current version: {current}");
        } else {
            info!(
                "applied {} migration(s), now at version {current}",
                applied.len()
            );
        }
        Ok(RunReport {
            applied,
            current_version: current,
        })
    }

    /// Applied/pending state of every known migration.
    pub fn status(
        &self,
        db: &mut dyn DatabaseHandle,
        migrations: &MigrationList,
    ) -> Result<StatusReport> {
        let records = self.ledger.records(db)?;
        let mut applied_at: BTreeMap<i64, Option<DateTime<Utc>>> = BTreeMap::new();
        for record in &records {
            applied_at.entry(record.version).or_insert(record.applied_at);
        }

        let entries = migrations
            .iter()
            .map(|m| StatusEntry {
                version: m.version(),
                name: m.name().to_string(),
                state: match applied_at.get(&m.version()) {
                    Some(at) => MigrationState::Applied { at: *at },
                    None => MigrationState::Pending,
                },
            })
            .collect();

        let orphaned = records
            .into_iter()
            .filter(|r| migrations.get(r.version).is_none())
            .collect();

        Ok(StatusReport {
            current_version: self.ledger.current_version(db)?,
            entries,
            orphaned,
        })
    }

    fn candidates(&self, migrations: &MigrationList, ceiling: i64) -> MigrationList {
        migrations.bounded(self.options.min_version, ceiling.min(self.options.max_version))
    }

    fn apply_one(&self, db: &mut dyn DatabaseHandle, migration: &Migration) -> Result<()> {
        let started = Instant::now();
        let version = migration.version();

        if migration.is_transactional() {
            db.begin()?;
            if let Err(e) = migration.apply(db) {
                rollback(db, version);
                error!("migration {migration} failed: {e}");
                return Err(apply_error(version, e));
            }
            if let Err(e) = self.ledger.record_applied(db, version) {
                rollback(db, version);
                return Err(e);
            }
            if let Err(e) = db.commit() {
                rollback(db, version);
                return Err(apply_error(version, e));
            }
        } else {
            debug!("running migration {migration} outside a transaction");
            migration.apply(db).map_err(|e| {
                error!("migration {migration} failed: {e}");
                apply_error(version, e)
            })?;
            if let Err(e) = self.ledger.record_applied(db, version) {
                warn!(
                    "migration {migration} ran without a transaction but could not be recorded; \
                     its changes are in place and it will be attempted again on the next run"
                );
                return Err(e);
            }
        }

        info!("OK   {migration} ({:.2?})", started.elapsed());
        Ok(())
    }
}

fn rollback(db: &mut dyn DatabaseHandle, version: i64) {
    if let Err(e) = db.rollback() {
        warn!("rollback after migration {version} failed: {e}");
    }
}

fn apply_error(version: i64, e: Error) -> Error {
    let reason = match e {
        Error::Apply { reason, .. } => reason,
        Error::Database(msg) => msg,
        other => other.to_string(),
    };
    Error::Apply { version, reason }
}
