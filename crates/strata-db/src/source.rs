//! Loading migration definitions from a directory of `.sql` files.
//!
//! A file named `<version>_<description>.sql` becomes one migration. Its body
//! may be split with annotation comments:
//!
//! ```sql
//! -- +strata NO TRANSACTION
//! -- +strata Up
//! CREATE INDEX CONCURRENTLY idx_users_email ON users (email);
//! -- +strata Down
//! DROP INDEX idx_users_email;
//! ```
//!
//! Without `Up`/`Down` markers the whole file is the up body. Down sections are
//! accepted and skipped.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use strata_common::{Error, Result};
use tracing::{debug, info};

use crate::migration::{Migration, MigrationList, Origin};

const ANNOTATION_PREFIX: &str = "-- +strata";

/// A directory of migration files plus any migrations registered in code.
#[derive(Debug, Clone, Default)]
pub struct MigrationSource {
    dir: Option<PathBuf>,
    registered: Vec<Migration>,
}

impl MigrationSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
            registered: Vec::new(),
        }
    }

    /// A source with no directory; only `register`ed migrations.
    pub fn code_only() -> Self {
        Self::default()
    }

    /// Add a migration defined in Rust. It shares the version space with the
    /// directory's files.
    pub fn register(mut self, migration: Migration) -> Self {
        self.registered.push(migration);
        self
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Read every definition and return them sorted by version.
    pub fn load(&self) -> Result<MigrationList> {
        let mut migrations = self.registered.clone();
        if let Some(dir) = &self.dir {
            migrations.extend(read_dir_migrations(dir)?);
        }
        let list = MigrationList::new(migrations)?;
        info!("loaded {} migration(s)", list.len());
        Ok(list)
    }

    /// Write an empty migration template named after `now` and return its path.
    pub fn create(dir: &Path, name: &str, now: DateTime<Utc>) -> Result<PathBuf> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(Error::Load(format!(
                "migration name must contain letters or digits: {name:?}"
            )));
        }

        fs::create_dir_all(dir)?;

        let filename = format!("{}_{slug}.sql", now.format("%Y%m%d%H%M%S"));
        let path = dir.join(filename);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    Error::Load(format!("{} already exists", path.display()))
                }
                _ => Error::Io(e),
            })?;
        file.write_all(template(name, now).as_bytes())?;

        info!("created migration {}", path.display());
        Ok(path)
    }
}

/// Shorthand for loading a directory with nothing registered in code.
pub fn load(dir: &Path) -> Result<MigrationList> {
    MigrationSource::new(dir).load()
}

fn read_dir_migrations(dir: &Path) -> Result<Vec<Migration>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        Error::Load(format!(
            "failed to read migrations directory {}: {e}",
            dir.display()
        ))
    })?;

    let mut migrations = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| Error::Load(format!("failed to read directory entry: {e}")))?;
        let path = entry.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "sql") {
            continue;
        }
        migrations.push(read_migration_file(&path)?);
    }
    Ok(migrations)
}

fn read_migration_file(path: &Path) -> Result<Migration> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Load(format!("invalid migration filename: {}", path.display())))?;
    let (version, name) = parse_filename(stem)
        .ok_or_else(|| {
            Error::Load(format!(
                "migration filename must start with a numeric version: {}",
                path.display()
            ))
        })?;

    let contents = fs::read_to_string(path)
        .map_err(|e| Error::Load(format!("failed to read {}: {e}", path.display())))?;
    let body = parse_body(&contents).map_err(|reason| {
        Error::Load(format!("{}: {reason}", path.display()))
    })?;

    debug!(
        "read migration {version} from {} (transactional: {})",
        path.display(),
        body.transactional
    );

    let migration = Migration::from_sql(version, name, body.up)
        .with_origin(Origin::File(path.to_path_buf()));
    Ok(if body.transactional {
        migration
    } else {
        migration.without_transaction()
    })
}

/// Split `00042_add_users` into `(42, "add_users")`.
fn parse_filename(stem: &str) -> Option<(i64, String)> {
    let digits = stem.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let version = stem[..digits].parse().ok()?;
    let rest = &stem[digits..];
    let name = rest.strip_prefix('_').unwrap_or(rest);
    if !rest.is_empty() && !rest.starts_with('_') {
        return None;
    }
    Some((version, name.to_string()))
}

#[derive(Debug, PartialEq)]
struct ParsedBody {
    up: String,
    transactional: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Up,
    Down,
}

fn parse_body(contents: &str) -> std::result::Result<ParsedBody, String> {
    let mut section = Section::Preamble;
    let mut transactional = true;
    let mut seen_up = false;
    let mut seen_down = false;
    let mut preamble = Vec::new();
    let mut up = Vec::new();

    for (lineno, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if let Some(directive) = trimmed.strip_prefix(ANNOTATION_PREFIX) {
            match directive.trim().to_ascii_lowercase().as_str() {
                "up" => {
                    if seen_up {
                        return Err(format!("line {}: duplicate Up section", lineno + 1));
                    }
                    seen_up = true;
                    section = Section::Up;
                }
                "down" => {
                    seen_down = true;
                    section = Section::Down;
                }
                "no transaction" => transactional = false,
                other => {
                    return Err(format!("line {}: unknown annotation {other:?}", lineno + 1));
                }
            }
            continue;
        }

        match section {
            Section::Preamble => preamble.push(line),
            Section::Up => up.push(line),
            Section::Down => {}
        }
    }

    if !seen_up && !seen_down {
        return Ok(ParsedBody {
            up: preamble.join("\n").trim().to_string(),
            transactional,
        });
    }
    if !seen_up {
        return Err(format!("Down section without an Up section ({ANNOTATION_PREFIX} Up)"));
    }
    if preamble.iter().any(|l| is_statement_line(l)) {
        return Err("statements found before the first Up/Down annotation".into());
    }

    Ok(ParsedBody {
        up: up.join("\n").trim().to_string(),
        transactional,
    })
}

fn is_statement_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with("--")
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

fn template(name: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {name}\n\
         -- Created: {}\n\
         \n\
         {ANNOTATION_PREFIX} Up\n\
         \n\
         \n\
         {ANNOTATION_PREFIX} Down\n\
         -- Not run by `strata up`; kept for manual rollback.\n",
        now.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn parses_version_and_name_from_filename() {
        assert_eq!(parse_filename("00001_init"), Some((1, "init".into())));
        assert_eq!(
            parse_filename("20240101120000_add_users_table"),
            Some((20240101120000, "add_users_table".into()))
        );
        assert_eq!(parse_filename("7"), Some((7, String::new())));
        assert_eq!(parse_filename("init"), None);
        assert_eq!(parse_filename("12abc"), None);
    }

    #[test]
    fn body_without_annotations_is_all_up() {
        let body = parse_body("CREATE TABLE t (id INTEGER);\n").unwrap();
        assert_eq!(body.up, "CREATE TABLE t (id INTEGER);");
        assert!(body.transactional);
    }

    #[test]
    fn down_section_is_dropped() {
        let body = parse_body(
            "-- header comment\n\
             -- +strata Up\n\
             CREATE TABLE t (id INTEGER);\n\
             -- +strata Down\n\
             DROP TABLE t;\n",
        )
        .unwrap();
        assert_eq!(body.up, "CREATE TABLE t (id INTEGER);");
    }

    #[test]
    fn no_transaction_annotation_is_honoured() {
        let body = parse_body("-- +strata NO TRANSACTION\n-- +strata Up\nSELECT 1;").unwrap();
        assert!(!body.transactional);
        assert_eq!(body.up, "SELECT 1;");
    }

    #[test]
    fn malformed_bodies_are_rejected() {
        assert!(parse_body("-- +strata Sideways\n").is_err());
        assert!(parse_body("-- +strata Down\nDROP TABLE t;").is_err());
        assert!(parse_body("SELECT 1;\n-- +strata Up\nSELECT 2;").is_err());
        assert!(parse_body("-- +strata Up\nSELECT 1;\n-- +strata Up\n").is_err());
    }

    #[test]
    fn load_sorts_and_skips_non_sql_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "003_third.sql", "SELECT 3;");
        write(dir.path(), "001_first.sql", "SELECT 1;");
        write(dir.path(), "002_second.sql", "SELECT 2;");
        write(dir.path(), "README.md", "not a migration");

        let list = load(dir.path()).unwrap();
        assert_eq!(list.versions(), vec![1, 2, 3]);
        assert_eq!(list.get(2).map(Migration::name), Some("second"));
        assert!(list.get(1).unwrap().source_path().is_some());
    }

    #[test]
    fn duplicate_versions_in_directory_fail() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "1_a.sql", "SELECT 1;");
        write(dir.path(), "001_b.sql", "SELECT 1;");

        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Load(ref msg) if msg.contains("duplicate")), "{err}");
    }

    #[test]
    fn missing_directory_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn bad_filename_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "create_users.sql", "SELECT 1;");
        assert!(matches!(load(dir.path()), Err(Error::Load(_))));
    }

    #[test]
    fn registered_migrations_share_version_space() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "2_from_file.sql", "SELECT 2;");

        let list = MigrationSource::new(dir.path())
            .register(Migration::from_sql(1, "from_code", "SELECT 1;"))
            .load()
            .unwrap();
        assert_eq!(list.versions(), vec![1, 2]);

        let clash = MigrationSource::new(dir.path())
            .register(Migration::from_sql(2, "clash", "SELECT 2;"))
            .load();
        assert!(matches!(clash, Err(Error::Load(_))));
    }

    #[test]
    fn create_writes_timestamped_template() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();

        let path = MigrationSource::create(dir.path(), "Add Users Table", now).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "20240309140507_add_users_table.sql"
        );

        let list = load(dir.path()).unwrap();
        let migration = list.get(20240309140507).unwrap();
        assert_eq!(migration.name(), "add_users_table");
        assert!(migration.is_transactional());

        let again = MigrationSource::create(dir.path(), "add users table", now);
        assert!(matches!(again, Err(Error::Load(_))));
    }

    #[test]
    fn create_rejects_empty_names() {
        let dir = tempfile::tempdir().unwrap();
        let err = MigrationSource::create(dir.path(), " -- ", Utc::now()).unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }
}
