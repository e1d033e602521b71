mod status;
mod wizard;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use strata_config::{AppConfig, ConfigLoader};
use strata_db::{
    LedgerConfig, MigrationList, MigrationSource, Migrator, MigratorOptions, RunReport,
    SqliteHandle, VersionLedger, dialect,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Versioned schema migrations with an applied-version ledger")]
#[command(version)]
struct Cli {
    /// Config file (defaults to strata.yml / strata.yaml / strata.toml in the working directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true, env = "STRATA_DATABASE")]
    database: Option<PathBuf>,

    /// Directory containing migration files
    #[arg(long, global = true, env = "STRATA_DIR")]
    dir: Option<PathBuf>,

    /// Name of the version table
    #[arg(long, global = true, env = "STRATA_TABLE")]
    table: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending migrations
    Up,
    /// Apply only the next pending migration
    UpByOne,
    /// Apply pending migrations up to and including VERSION
    UpTo { version: i64 },
    /// Apply every migration missing from the ledger, including gaps below the current version
    UpAll,
    /// Show applied and pending migrations
    Status,
    /// Print the current database version
    Version,
    /// Create a new migration file
    Create {
        /// Short description, used in the file name
        name: String,
    },
    /// Write a strata.yml interactively
    Init,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let mut config = ConfigLoader::load_or_default(cli.config.as_deref(), &cwd)
        .context("failed to load configuration")?;
    apply_overrides(&mut config, &cli);

    match cli.command {
        Commands::Init => wizard::run_wizard(&cwd)?,
        Commands::Create { name } => {
            let path = MigrationSource::create(&config.migrations.dir, &name, Utc::now())
                .context("failed to create migration")?;
            println!("Created {}", path.display());
        }
        Commands::Up => run(&config, |m, db, list| m.apply_all(db, list))?,
        Commands::UpByOne => run(&config, |m, db, list| m.apply_next(db, list))?,
        Commands::UpTo { version } => {
            run(&config, |m, db, list| m.apply_up_to(db, list, version))?
        }
        Commands::UpAll => run(&config, |m, db, list| m.apply_all_unapplied(db, list))?,
        Commands::Status => {
            let (migrator, mut db) = connect(&config)?;
            let migrations = load_migrations(&config.migrations.dir)?;
            let report = migrator
                .status(&mut db, &migrations)
                .context("failed to read migration status")?;
            status::print_status(&report, &config.database.path);
        }
        Commands::Version => {
            let (migrator, mut db) = connect(&config)?;
            let version = migrator
                .version(&mut db)
                .context("failed to read current version")?;
            println!("version {version}");
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(database) = &cli.database {
        config.database.path = database.clone();
    }
    if let Some(dir) = &cli.dir {
        config.migrations.dir = dir.clone();
    }
    if let Some(table) = &cli.table {
        config.migrations.table = table.clone();
    }
}

fn connect(config: &AppConfig) -> Result<(Migrator, SqliteHandle)> {
    let sql_dialect = dialect::by_name(&config.database.dialect)?;
    if sql_dialect.name() != "sqlite" {
        bail!(
            "dialect {:?} has no built-in driver; use strata-db with your own DatabaseHandle",
            sql_dialect.name()
        );
    }

    let ledger = VersionLedger::new(
        LedgerConfig::new(config.migrations.table.clone())?,
        sql_dialect,
    );
    let options = MigratorOptions {
        min_version: config.migrations.min_version,
        max_version: config.migrations.max_version_or_unbounded(),
    };

    let db = SqliteHandle::open(&config.database.path).with_context(|| {
        format!("failed to open database {}", config.database.path.display())
    })?;
    Ok((Migrator::new(ledger, options), db))
}

fn load_migrations(dir: &Path) -> Result<MigrationList> {
    MigrationSource::new(dir)
        .load()
        .with_context(|| format!("failed to load migrations from {}", dir.display()))
}

fn run<F>(config: &AppConfig, mode: F) -> Result<()>
where
    F: FnOnce(&Migrator, &mut SqliteHandle, &MigrationList) -> strata_common::Result<RunReport>,
{
    let migrations = load_migrations(&config.migrations.dir)?;
    let (migrator, mut db) = connect(config)?;

    let report = mode(&migrator, &mut db, &migrations)?;
    if report.is_noop() {
        println!(
            "No migrations to run. Current version: {}",
            report.current_version
        );
    } else {
        info!(
            "applied {} migration(s): {:?}",
            report.applied.len(),
            report.applied
        );
        println!(
            "Applied {} migration(s). Current version: {}",
            report.applied.len(),
            report.current_version
        );
    }
    Ok(())
}
