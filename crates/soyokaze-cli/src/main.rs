mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use soyokaze_config::{AppConfig, ConfigLoader, LogConfig};
use soyokaze_db::Database;
use soyokaze_db::migrations::{MIGRATIONS, latest_version, pending};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soyokaze", version, about = "Manage the Soyokaze journal database")]
struct Cli {
    /// Config file. Defaults to ~/.soyokaze/config.{yml,yaml,toml}.
    #[arg(long, short, env = "SOYOKAZE_CONFIG")]
    config: Option<PathBuf>,

    /// Database file, overriding the configured path.
    #[arg(long, env = "SOYOKAZE_DB")]
    db: Option<PathBuf>,

    /// Print reports as JSON.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply all pending schema migrations.
    Migrate,
    /// Show applied and pending migrations. Opens read-only and never creates the file.
    Status,
    /// Revert migrations newer than the target version using their down scripts.
    Rollback {
        #[arg(long)]
        to: u32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_dir = ConfigLoader::default_config_dir();
    let config = match &cli.config {
        Some(path) => ConfigLoader::load(path)?,
        None => ConfigLoader::load_or_default(&config_dir)?,
    };
    init_tracing(&config.log);

    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(|| config.database.resolve_path(&config_dir));

    match cli.command {
        Command::Migrate => {
            let db = open(&db_path, &config)?;
            let report = db.migrate().context("database migration failed")?;
            report::print_migration(&report, cli.json)?;
            db.close()?;
        }
        Command::Status => {
            info!("using database {}", db_path.display());
            let db = Database::open_read_only(&db_path, &config.database)
                .with_context(|| format!("failed to open {}", db_path.display()))?;
            let current = db.current_version()?;
            let applied = db.applied_migrations()?;
            let status = report::Status {
                database: &db_path,
                current_version: current,
                latest_version: latest_version(MIGRATIONS),
                applied: &applied,
                pending: &pending(MIGRATIONS, current),
            };
            report::print_status(&status, cli.json)?;
            db.close()?;
        }
        Command::Rollback { to } => {
            let db = open(&db_path, &config)?;
            let report = db
                .rollback_to(to)
                .with_context(|| format!("rollback to version {to} failed"))?;
            report::print_rollback(&report, cli.json)?;
            db.close()?;
        }
    }

    Ok(())
}

fn open(db_path: &std::path::Path, config: &AppConfig) -> Result<Database> {
    info!("using database {}", db_path.display());
    Database::open_unmigrated(db_path, &config.database)
        .with_context(|| format!("failed to open {}", db_path.display()))
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
