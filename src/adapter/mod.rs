//! Database adapter seam.
//!
//! Provides the `DatabaseAdapter` trait that every storage backend implements.
//! The registry, entities and collections only ever talk to the store through
//! this trait, so any connection type (a single connection, a pooled one, a
//! test double counting statements) can be plugged in.

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteAdapter;

use crate::error::Result;
use crate::sql::Dialect;
use crate::value::{FieldMap, FieldValue};

/// Statement parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Params {
    #[default]
    None,
    /// Bound to `?` placeholders in order
    Positional(Vec<FieldValue>),
    /// Bound to `:name` placeholders
    Named(Vec<(String, FieldValue)>),
}

impl Params {
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        Params::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Params::Named(
            values
                .into_iter()
                .map(|(k, v)| {
                    let key: String = k.into();
                    let key = if key.starts_with(':') { key } else { format!(":{key}") };
                    (key, v.into())
                })
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Params::None => true,
            Params::Positional(v) => v.is_empty(),
            Params::Named(v) => v.is_empty(),
        }
    }
}

impl From<Vec<FieldValue>> for Params {
    fn from(values: Vec<FieldValue>) -> Self {
        Params::Positional(values)
    }
}

/// Column of a table as reported by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared default, `Null` when none
    pub default: FieldValue,
    pub primary_key: bool,
}

/// Trait for executing statements against a relational store
///
/// Implementations must be shareable between threads; the registry holds one
/// adapter behind an `Arc` for its whole lifetime.
///
/// # Examples
///
/// ```
/// use rowguard::adapter::{DatabaseAdapter, Params, SqliteAdapter};
///
/// # fn main() -> rowguard::Result<()> {
/// let db = SqliteAdapter::open_in_memory()?;
/// db.query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT DEFAULT '')", &Params::None)?;
/// let id = db.insert("notes", &rowguard::fields! { "body" => "hello" })?;
/// let row = db.fetch_row("SELECT * FROM notes WHERE id = ?", &Params::positional([id]))?;
/// assert_eq!(row.unwrap()["body"].as_str(), Some("hello"));
/// # Ok(())
/// # }
/// ```
pub trait DatabaseAdapter: Send + Sync {
    /// Execute a query and return every row
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` carrying the driver message and the statement.
    fn fetch_rows(&self, sql: &str, params: &Params) -> Result<Vec<FieldMap>>;

    /// Execute a query and return its first row, if any
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the statement fails.
    fn fetch_row(&self, sql: &str, params: &Params) -> Result<Option<FieldMap>> {
        Ok(self.fetch_rows(sql, params)?.into_iter().next())
    }

    /// Execute a query and return the first column of its first row
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the statement fails.
    fn fetch_single_value(&self, sql: &str, params: &Params) -> Result<Option<FieldValue>>;

    /// Execute a statement and return the number of affected rows
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the statement fails.
    fn query(&self, sql: &str, params: &Params) -> Result<u64>;

    /// Insert a row and return its generated id
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the insert fails.
    fn insert(&self, table: &str, fields: &FieldMap) -> Result<i64>;

    /// Columns of `table` in declaration order
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the schema cannot be read.
    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;

    /// Names of every table in the store
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` when the schema cannot be read.
    fn tables(&self) -> Result<Vec<String>>;

    /// # Errors
    ///
    /// Returns `OrmError::Driver` when a transaction is already open or the
    /// store refuses to start one.
    fn begin_transaction(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns `OrmError::Driver` when no transaction is open.
    fn commit(&self) -> Result<()>;

    /// # Errors
    ///
    /// Returns `OrmError::Driver` when no transaction is open.
    fn rollback(&self) -> Result<()>;

    fn in_transaction(&self) -> bool;

    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }
}

/// Run `f` inside a transaction unless one is already open.
///
/// Commits on success and rolls back on error. When a transaction is already
/// open, `f` simply joins it.
///
/// # Errors
///
/// Propagates the error of `f`, or the adapter's begin/commit failure.
pub fn with_transaction<T>(
    adapter: &dyn DatabaseAdapter,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if adapter.in_transaction() {
        return f();
    }
    adapter.begin_transaction()?;
    match f() {
        Ok(value) => {
            adapter.commit()?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = adapter.rollback() {
                log::warn!("rollback after failure also failed: {rollback_err}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_params_get_colon_prefix() {
        let params = Params::named([("id", 1), (":x", 2)]);
        match params {
            Params::Named(values) => {
                assert_eq!(values[0].0, ":id");
                assert_eq!(values[1].0, ":x");
            }
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn test_params_is_empty() {
        assert!(Params::None.is_empty());
        assert!(Params::positional(Vec::<i64>::new()).is_empty());
        assert!(!Params::positional([1]).is_empty());
    }
}
