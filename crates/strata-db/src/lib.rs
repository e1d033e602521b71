//! Versioned schema migrations with a persisted ledger of applied versions.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use strata_db::{Migrator, MigrationSource, SqliteHandle};
//!
//! let mut db = SqliteHandle::open(Path::new("app.db"))?;
//! let migrations = MigrationSource::new("migrations").load()?;
//! let report = Migrator::sqlite().apply_all(&mut db, &migrations)?;
//! println!("now at version {}", report.current_version);
//! # Ok::<(), strata_common::Error>(())
//! ```

pub mod dialect;
pub mod handle;
pub mod ledger;
pub mod migration;
pub mod runner;
pub mod sequencer;
pub mod source;
pub mod sqlite;

pub use dialect::Dialect;
pub use handle::{DatabaseHandle, Row, SqlValue};
pub use ledger::{DEFAULT_TABLE, LedgerConfig, VersionLedger, VersionRecord};
pub use migration::{Migration, MigrationAction, MigrationList, Origin, SqlScript};
pub use runner::{
    MigrationState, Migrator, MigratorOptions, RunReport, StatusEntry, StatusReport,
};
pub use source::MigrationSource;
pub use sqlite::SqliteHandle;
