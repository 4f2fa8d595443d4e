//! Rowguard Migration CLI Tool
//!
//! Applies versioned `NNN_description.sql` files to a SQLite database and
//! reports where the schema stands.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rowguard::config::OrmConfig;
use rowguard::migration::{discover_migrations, MigrationReport, SqlFileMigrator};
use rowguard::SqliteAdapter;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rowguard-migrate")]
#[command(about = "SQL file migrations for Rowguard databases")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database file; defaults to `database.path` from the configuration
    #[arg(long, env = "ROWGUARD_DATABASE_PATH")]
    db: Option<String>,

    /// Migrations directory path
    #[arg(long, default_value = "migrations")]
    dir: PathBuf,

    /// Name of the version table
    #[arg(long, default_value = "migration")]
    table: String,

    /// Treat backslashes inside quotes as escapes (MySQL dumps)
    #[arg(long)]
    backslash_escapes: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations
    Migrate {
        /// Last version to apply (default: all pending)
        #[arg(long)]
        version: Option<u32>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the current version and pending files
    Status,

    /// Drop every table, the version table included
    Drop {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Create the next numbered migration file
    Generate {
        /// Migration name (e.g., "create_users_table")
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(true) => {
            if !cli.quiet {
                println!("✅ Success");
            }
        }
        Ok(false) => process::exit(2),
        Err(e) => {
            eprintln!("❌ Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Run the selected command; `Ok(false)` when a migration file failed
fn run(cli: &Cli) -> anyhow::Result<bool> {
    if let Commands::Generate { name } = &cli.command {
        handle_generate(&cli.dir, name)?;
        return Ok(true);
    }

    let path = match &cli.db {
        Some(path) => path.clone(),
        None => OrmConfig::load().context("loading configuration")?.database.path,
    };
    let adapter = Arc::new(SqliteAdapter::open(&path).with_context(|| format!("opening {path}"))?);
    let migrator = SqlFileMigrator::new(adapter, &cli.dir)
        .table(cli.table.clone())
        .backslash_escapes(cli.backslash_escapes);

    match &cli.command {
        Commands::Migrate { version, json } => handle_migrate(&migrator, *version, *json, cli.quiet),
        Commands::Status => handle_status(&migrator).map(|()| true),
        Commands::Drop { yes } => handle_drop(&migrator, *yes).map(|()| true),
        Commands::Generate { .. } => Ok(true),
    }
}

fn handle_migrate(migrator: &SqlFileMigrator, target: Option<u32>, json: bool, quiet: bool) -> anyhow::Result<bool> {
    let mut progress = |statement: &str, report: &MigrationReport| {
        log::debug!("[{}] {}", report.queries_executed, first_line(statement));
    };
    let report = migrator.migrate(target, Some(&mut progress))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !quiet {
        for file in &report.applied {
            println!("  ✓ {:03}_{} ({})", file.version, file.name, &file.checksum[..12]);
        }
        println!(
            "\n📈 Summary: {} queries, now at version {}",
            report.queries_executed, report.version
        );
    }
    if let Some(error) = &report.error {
        eprintln!("❌ Migration failed: {error}");
    }
    Ok(report.success)
}

fn handle_status(migrator: &SqlFileMigrator) -> anyhow::Result<()> {
    let status = migrator.status()?;

    println!("\n📊 Migration Status\n");
    println!("Current version: {}", status.current_version);
    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending.len());
        for pending in &status.pending {
            println!("  ⏳ {:03}_{}", pending.version, pending.name);
        }
    }
    Ok(())
}

fn handle_drop(migrator: &SqlFileMigrator, confirmed: bool) -> anyhow::Result<()> {
    if !confirmed {
        bail!("refusing to drop every table without --yes");
    }
    let dropped = migrator.drop_all()?;
    println!("🗑  Dropped {} table(s)", dropped.len());
    Ok(())
}

fn handle_generate(dir: &Path, name: &str) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let filename = next_file_name(dir, name)?;
    let path = dir.join(&filename);
    let template = format!(
        "-- Migration: {name}\n-- Generated: {}\n\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    fs::write(&path, template).with_context(|| format!("writing {}", path.display()))?;

    println!("✅ Generated migration: {}", path.display());
    Ok(())
}

/// `NNN_name.sql` with the version after the newest file in `dir`
fn next_file_name(dir: &Path, name: &str) -> anyhow::Result<String> {
    let last = discover_migrations(dir)?
        .last()
        .map_or(0, |m| m.version);
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if slug.is_empty() {
        bail!("migration name is empty");
    }
    Ok(format!("{:03}_{slug}.sql", last + 1))
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or_default()
}
