//! SQL-file migrations
//!
//! A migrations directory holds plain SQL files named `NNN_description.sql`,
//! where the 2 to 4 leading digits are the version. The current version is
//! kept in a one-row table (`migration` by default). Each newer file is split
//! into statements by a [`DumpParser`] and applied inside its own transaction.
//!
//! Failures inside a file are not errors of the runner: they are reported in
//! the returned [`MigrationReport`] together with the progress made so far.
//!
//! # Example
//!
//! ```rust,no_run
//! use rowguard::adapter::SqliteAdapter;
//! use rowguard::migration::SqlFileMigrator;
//! use std::sync::Arc;
//!
//! # fn main() -> rowguard::Result<()> {
//! let adapter = Arc::new(SqliteAdapter::open("app.db")?);
//! let report = SqlFileMigrator::new(adapter, "migrations").migrate(None, None)?;
//! if !report.success {
//!     eprintln!("stopped at version {}: {}", report.version, report.error.unwrap_or_default());
//! }
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod file;
pub mod migrator;
pub mod parser;

pub use checksum::{calculate_checksum, checksum_of};
pub use file::{discover_migrations, MigrationFile};
pub use migrator::{AppliedFile, MigrationReport, MigrationStatus, SqlFileMigrator};
pub use parser::{DumpParser, ParseControl, SqlDumpParser};
