//! SqlFileMigrator - applies versioned SQL files in order

use super::checksum::checksum_of;
use super::file::{discover_migrations, MigrationFile};
use super::parser::{DumpParser, ParseControl, SqlDumpParser};
use crate::adapter::{DatabaseAdapter, Params};
use crate::error::Result;
use crate::sql::quote_identifier;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

const DEFAULT_TABLE: &str = "migration";

/// A file applied during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedFile {
    pub version: u32,
    pub name: String,
    /// SHA-256 of the file content
    pub checksum: String,
}

/// Outcome of a migration run
///
/// `version` is the last version committed, which is the starting version
/// when nothing was applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub queries_executed: usize,
    pub version: u32,
    pub success: bool,
    pub error: Option<String>,
    pub applied: Vec<AppliedFile>,
}

/// Current version plus the files a run would apply
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub current_version: u32,
    pub pending: Vec<MigrationFile>,
}

/// Per-statement progress callback: the statement just run and the report so far
pub type ProgressFn<'a> = &'a mut dyn FnMut(&str, &MigrationReport);

/// Runs `NNN_description.sql` files from a directory against an adapter
pub struct SqlFileMigrator {
    adapter: Arc<dyn DatabaseAdapter>,
    dir: PathBuf,
    table: String,
    backslash_escapes: bool,
}

impl SqlFileMigrator {
    pub fn new(adapter: Arc<dyn DatabaseAdapter>, dir: impl AsRef<Path>) -> Self {
        Self {
            adapter,
            dir: dir.as_ref().to_path_buf(),
            table: DEFAULT_TABLE.to_string(),
            backslash_escapes: false,
        }
    }

    /// Name of the version table (`migration` by default)
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Parse migration files with MySQL backslash escapes inside quotes
    #[must_use]
    pub fn backslash_escapes(mut self, enabled: bool) -> Self {
        self.backslash_escapes = enabled;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read the stored version, creating the version table and its row when missing
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` if the version table can't be created or read.
    pub fn current_version(&self) -> Result<u32> {
        let table = quote_identifier(&self.table);
        if !self.adapter.tables()?.iter().any(|t| t == &self.table) {
            log::info!("creating migration version table {}", self.table);
            self.adapter.query(
                &format!("CREATE TABLE {table} (`version` INTEGER NOT NULL DEFAULT 0)"),
                &Params::None,
            )?;
        }
        let rows = self
            .adapter
            .fetch_single_value(&format!("SELECT COUNT(*) FROM {table}"), &Params::None)?
            .map_or(0, |v| v.as_id());
        if rows == 0 {
            self.adapter
                .query(&format!("INSERT INTO {table} (`version`) VALUES (0)"), &Params::None)?;
        }
        let version = self
            .adapter
            .fetch_single_value(&format!("SELECT `version` FROM {table} LIMIT 1"), &Params::None)?
            .map_or(0, |v| v.as_id());
        Ok(u32::try_from(version).unwrap_or(0))
    }

    /// Stored version and the files newer than it
    ///
    /// # Errors
    ///
    /// * `OrmError::Io` - the directory can't be read
    /// * `OrmError::Driver` - the version table can't be read
    pub fn status(&self) -> Result<MigrationStatus> {
        let current_version = self.current_version()?;
        let pending = discover_migrations(&self.dir)?
            .into_iter()
            .filter(|m| m.version > current_version)
            .collect();
        Ok(MigrationStatus {
            current_version,
            pending,
        })
    }

    /// Apply every pending file up to `target` (all of them when `None`).
    ///
    /// Each file runs in its own transaction together with the version bump.
    /// The first failing statement rolls its file back and ends the run; the
    /// failure is described in the report, not returned as an error.
    ///
    /// # Arguments
    ///
    /// * `target` - last version to apply
    /// * `progress` - called after every statement, failed ones included
    ///
    /// # Errors
    ///
    /// Only failures outside a migration file: an unreadable directory or
    /// file, or a version table that can't be read or updated.
    pub fn migrate(&self, target: Option<u32>, mut progress: Option<ProgressFn<'_>>) -> Result<MigrationReport> {
        let status = self.status()?;
        let mut report = MigrationReport {
            version: status.current_version,
            success: true,
            ..MigrationReport::default()
        };

        let pending = status
            .pending
            .into_iter()
            .filter(|m| target.map_or(true, |t| m.version <= t));

        for file in pending {
            let start = Instant::now();
            let content = fs::read_to_string(&file.path)?;
            let parser = SqlDumpParser::new(content).backslash_escapes(self.backslash_escapes);
            log::info!("applying migration {:03} {}", file.version, file.name);

            self.adapter.begin_transaction()?;
            parser.parse(&mut |statement| {
                match self.adapter.query(statement, &Params::None) {
                    Ok(_) => report.queries_executed += 1,
                    Err(e) => {
                        report.success = false;
                        report.error = Some(e.to_string());
                    }
                }
                if let Some(callback) = progress.as_mut() {
                    callback(statement, &report);
                }
                if report.success {
                    ParseControl::Continue
                } else {
                    ParseControl::Stop
                }
            });

            if !report.success {
                log::warn!("migration {:03} failed, rolling back", file.version);
                self.adapter.rollback()?;
                break;
            }
            if let Err(e) = self.save_version(file.version) {
                self.adapter.rollback()?;
                return Err(e);
            }
            self.adapter.commit()?;

            report.version = file.version;
            report.applied.push(AppliedFile {
                version: file.version,
                name: file.name,
                checksum: checksum_of(parser.source()),
            });
            log::info!(
                "migration {:03} applied in {}ms",
                file.version,
                start.elapsed().as_millis()
            );
        }
        Ok(report)
    }

    /// Drop every table of the store, the version table included
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` on the first failing `DROP TABLE`.
    pub fn drop_all(&self) -> Result<Vec<String>> {
        let tables = self.adapter.tables()?;
        for table in &tables {
            log::info!("dropping table {table}");
            self.adapter
                .query(&format!("DROP TABLE {}", quote_identifier(table)), &Params::None)?;
        }
        Ok(tables)
    }

    fn save_version(&self, version: u32) -> Result<()> {
        self.adapter.query(
            &format!("UPDATE {} SET `version`=?", quote_identifier(&self.table)),
            &Params::positional([i64::from(version)]),
        )?;
        Ok(())
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::adapter::SqliteAdapter;
    use crate::value::FieldValue;

    fn setup() -> (Arc<SqliteAdapter>, tempfile::TempDir) {
        let adapter = Arc::new(SqliteAdapter::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("001_create.sql"),
            "CREATE TABLE items (id INTEGER PRIMARY KEY, title TEXT);\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("002_seed.sql"),
            "INSERT INTO items (title) VALUES ('a;1');\nINSERT INTO items (title) VALUES ('b');\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("003_more.sql"),
            "-- third\nINSERT INTO items (title) VALUES ('c');\n",
        )
        .unwrap();
        (adapter, dir)
    }

    fn count_items(adapter: &SqliteAdapter) -> i64 {
        adapter
            .fetch_single_value("SELECT COUNT(*) FROM items", &Params::None)
            .unwrap()
            .map_or(0, |v| v.as_id())
    }

    #[test]
    fn test_applies_all_pending_files() {
        let (adapter, dir) = setup();
        let migrator = SqlFileMigrator::new(adapter.clone(), dir.path());
        let report = migrator.migrate(None, None).unwrap();

        assert!(report.success);
        assert_eq!(report.version, 3);
        assert_eq!(report.queries_executed, 4);
        assert_eq!(report.applied.len(), 3);
        assert_eq!(report.applied[0].checksum.len(), 64);
        assert_eq!(count_items(&adapter), 3);
        assert_eq!(migrator.current_version().unwrap(), 3);

        let again = migrator.migrate(None, None).unwrap();
        assert!(again.success);
        assert_eq!(again.queries_executed, 0);
        assert_eq!(again.version, 3);
    }

    #[test]
    fn test_stops_at_target_version() {
        let (adapter, dir) = setup();
        let migrator = SqlFileMigrator::new(adapter.clone(), dir.path());
        let report = migrator.migrate(Some(2), None).unwrap();
        assert_eq!(report.version, 2);
        assert_eq!(count_items(&adapter), 2);
        assert_eq!(migrator.status().unwrap().pending.len(), 1);
    }

    #[test]
    fn test_failing_file_rolls_back_and_reports() {
        let (adapter, dir) = setup();
        fs::write(
            dir.path().join("004_broken.sql"),
            "INSERT INTO items (title) VALUES ('d');\nINSERT INTO missing VALUES (1);\n",
        )
        .unwrap();
        let migrator = SqlFileMigrator::new(adapter.clone(), dir.path());
        let mut seen = Vec::new();
        let mut progress = |sql: &str, _: &MigrationReport| seen.push(sql.to_string());
        let report = migrator.migrate(None, Some(&mut progress)).unwrap();

        assert!(!report.success);
        assert_eq!(report.version, 3);
        assert_eq!(report.queries_executed, 5);
        assert!(report.error.as_deref().unwrap_or_default().contains("missing"));
        assert_eq!(seen.last().map(String::as_str), Some("INSERT INTO missing VALUES (1)"));
        assert_eq!(count_items(&adapter), 3);
        assert_eq!(migrator.current_version().unwrap(), 3);
    }

    #[test]
    fn test_custom_version_table() {
        let (adapter, dir) = setup();
        let migrator = SqlFileMigrator::new(adapter.clone(), dir.path()).table("schema_version");
        migrator.migrate(Some(1), None).unwrap();
        let stored = adapter
            .fetch_single_value("SELECT version FROM schema_version", &Params::None)
            .unwrap();
        assert_eq!(stored, Some(FieldValue::Int(1)));
    }

    #[test]
    fn test_drop_all() {
        let (adapter, dir) = setup();
        let migrator = SqlFileMigrator::new(adapter.clone(), dir.path());
        migrator.migrate(None, None).unwrap();
        let dropped = migrator.drop_all().unwrap();
        assert_eq!(dropped, vec!["items".to_string(), "migration".to_string()]);
        assert!(adapter.tables().unwrap().is_empty());
    }
}
