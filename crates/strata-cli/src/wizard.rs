use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dialoguer::{Confirm, Input, Select};
use strata_config::{AppConfig, ConfigLoader, DatabaseConfig, MigrationsConfig};
use tracing::info;

/// Run the interactive setup. Writes strata.yml into `project_dir` and
/// creates the migrations directory.
pub fn run_wizard(project_dir: &Path) -> Result<()> {
    if !std::io::stdin().is_terminal() {
        println!("Non-interactive environment detected.");
        println!(
            "To configure Strata, create: {}/strata.yml",
            project_dir.display()
        );
        println!();
        println!("Minimal strata.yml example:");
        println!("---");
        print!("{}", example_yaml()?);
        return Ok(());
    }

    let config_path = project_dir.join("strata.yml");
    if config_path.exists() {
        let overwrite = Confirm::new()
            .with_prompt(format!("{} already exists. Overwrite?", config_path.display()))
            .default(false)
            .interact()
            .context("overwrite confirmation cancelled")?;
        if !overwrite {
            println!("  Keeping existing config.");
            return Ok(());
        }
    }

    println!();
    println!("  Strata Setup");
    println!("  ------------");
    println!();

    // --- Database ---
    let dialects = &["sqlite", "postgres", "mysql"];
    let selection = Select::new()
        .with_prompt("Version table dialect")
        .items(dialects)
        .default(0)
        .interact()
        .context("dialect selection cancelled")?;
    let dialect = dialects[selection];

    let db_path: String = Input::new()
        .with_prompt("SQLite database file")
        .default(DatabaseConfig::default().path.display().to_string())
        .interact_text()
        .context("database path input cancelled")?;

    // --- Migrations ---
    let defaults = MigrationsConfig::default();
    let dir: String = Input::new()
        .with_prompt("Migrations directory")
        .default(defaults.dir.display().to_string())
        .interact_text()
        .context("migrations directory input cancelled")?;

    let table: String = Input::new()
        .with_prompt("Version table name")
        .default(defaults.table.clone())
        .validate_with(|input: &String| {
            strata_db::LedgerConfig::new(input.as_str())
                .map(|_| ())
                .map_err(|e| e.to_string())
        })
        .interact_text()
        .context("table name input cancelled")?;

    let config = AppConfig {
        database: DatabaseConfig {
            path: PathBuf::from(db_path.trim()),
            dialect: dialect.to_string(),
        },
        migrations: MigrationsConfig {
            dir: PathBuf::from(dir.trim()),
            table,
            ..defaults
        },
    };

    ConfigLoader::save(&config_path, &config).context("failed to write config")?;

    let migrations_dir = project_dir.join(&config.migrations.dir);
    std::fs::create_dir_all(&migrations_dir)
        .with_context(|| format!("failed to create {}", migrations_dir.display()))?;

    info!("config written to {}", config_path.display());
    println!();
    println!("  Config written to {}", config_path.display());
    println!("  Run `strata create <name>` to add your first migration.");
    println!();

    Ok(())
}

fn example_yaml() -> Result<String> {
    serde_yaml::to_string(&AppConfig::default()).context("failed to serialize example config")
}
