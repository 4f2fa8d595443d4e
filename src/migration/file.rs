//! Migration file discovery

use crate::error::{OrmError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{2,4})(?:_(.*))?\.sql$").expect("valid migration file pattern"));

/// A discovered migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    pub path: PathBuf,

    /// Version taken from the leading digits of the file name
    pub version: u32,

    /// Description after the version, empty when absent
    pub name: String,
}

impl MigrationFile {
    /// Parse a migration file name into its version and description
    ///
    /// Expected format: `NNN_description.sql` with 2 to 4 digits.
    ///
    /// # Example
    /// - `002_add_items.sql` → version: 2, name: "add_items"
    pub fn parse_filename(filename: &str) -> Option<(u32, String)> {
        let caps = FILE_NAME.captures(filename)?;
        let version = caps.get(1)?.as_str().parse::<u32>().ok()?;
        let name = caps.get(2).map_or("", |m| m.as_str()).to_string();
        Some((version, name))
    }
}

/// Discover all migration files in a directory
///
/// Files not matching `NNN_description.sql` are skipped. The result is
/// sorted by version, oldest first.
///
/// # Errors
///
/// * `OrmError::Io` - the directory can't be read
/// * `OrmError::InvalidArgument` - two files share a version
pub fn discover_migrations(migrations_dir: &Path) -> Result<Vec<MigrationFile>> {
    let mut migrations = Vec::new();
    for entry in fs::read_dir(migrations_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((version, name)) = MigrationFile::parse_filename(filename) else {
            log::debug!("skipping {filename}: not a migration file");
            continue;
        };
        migrations.push(MigrationFile { path, version, name });
    }

    migrations.sort_by_key(|m| m.version);
    if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
        return Err(OrmError::InvalidArgument(format!(
            "migration version {} is used by both {} and {}",
            pair[0].version,
            pair[0].path.display(),
            pair[1].path.display()
        )));
    }
    Ok(migrations)
}
