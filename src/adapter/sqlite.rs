//! SQLite adapter built on `rusqlite`.

use super::{ColumnInfo, DatabaseAdapter, Params};
use crate::error::{OrmError, Result};
use crate::sql::quote_identifier;
use crate::value::{FieldMap, FieldValue};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, Statement, ToSql};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            FieldValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> FieldValue {
    match value {
        ValueRef::Null => FieldValue::Null,
        ValueRef::Integer(i) => FieldValue::Int(i),
        ValueRef::Real(f) => FieldValue::Float(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            FieldValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// Interpret the `dflt_value` column of `PRAGMA table_info`
fn parse_default(raw: Option<String>) -> FieldValue {
    let Some(raw) = raw else {
        return FieldValue::Null;
    };
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return FieldValue::Null;
    }
    if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
        return FieldValue::Text(trimmed[1..trimmed.len() - 1].replace("''", "'"));
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return FieldValue::Int(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return FieldValue::Float(f);
    }
    FieldValue::Text(trimmed.to_string())
}

fn bind(stmt: &mut Statement<'_>, params: &Params) -> rusqlite::Result<()> {
    match params {
        Params::None => {}
        Params::Positional(values) => {
            for (i, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
        }
        Params::Named(values) => {
            for (name, value) in values {
                if let Some(index) = stmt.parameter_index(name)? {
                    stmt.raw_bind_parameter(index, value)?;
                }
            }
        }
    }
    Ok(())
}

/// Adapter over a single SQLite connection.
///
/// The connection sits behind a mutex so the adapter can be shared through
/// an `Arc` by the registry and every entity.
pub struct SqliteAdapter {
    conn: Mutex<Connection>,
}

impl SqliteAdapter {
    /// Open (or create) a database file
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .map_err(|e| OrmError::driver(e.to_string(), format!("open {}", path.display())))?;
        Ok(Self::from_connection(conn))
    }

    /// # Errors
    ///
    /// Returns `OrmError::Driver` if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| OrmError::driver(e.to_string(), "open :memory:"))?;
        Ok(Self::from_connection(conn))
    }

    /// Open the database named by `database.path`; `:memory:` opens a private in-memory store
    ///
    /// # Errors
    ///
    /// Returns `OrmError::Driver` if the database cannot be opened.
    pub fn from_config(config: &crate::config::OrmConfig) -> Result<Self> {
        if config.database.path == ":memory:" {
            Self::open_in_memory()
        } else {
            Self::open(&config.database.path)
        }
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self, sql: &str) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| OrmError::driver("connection mutex poisoned", sql))
    }

    /// Run `op` with timing, logging and error mapping around it
    fn instrumented<T>(
        &self,
        sql: &str,
        op: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::execute_query_span(sql).entered();

        log::debug!("executing: {sql}");
        let conn = self.lock(sql)?;
        let start = Instant::now();
        let result = op(&conn).map_err(|e| {
            #[cfg(feature = "metrics")]
            METRICS.record_query_error();
            log::debug!("statement failed: {e}");
            OrmError::driver(e.to_string(), sql)
        });

        let duration = start.elapsed();
        #[cfg(feature = "metrics")]
        METRICS.record_query_duration(duration);
        #[cfg(not(feature = "metrics"))]
        let _ = duration;

        result
    }
}

impl DatabaseAdapter for SqliteAdapter {
    fn fetch_rows(&self, sql: &str, params: &Params) -> Result<Vec<FieldMap>> {
        self.instrumented(sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            bind(&mut stmt, params)?;
            let mut rows = stmt.raw_query();
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut map = FieldMap::new();
                for (i, name) in names.iter().enumerate() {
                    map.insert(name.clone(), from_value_ref(row.get_ref(i)?));
                }
                out.push(map);
            }
            Ok(out)
        })
    }

    fn fetch_single_value(&self, sql: &str, params: &Params) -> Result<Option<FieldValue>> {
        self.instrumented(sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            bind(&mut stmt, params)?;
            let mut rows = stmt.raw_query();
            match rows.next()? {
                Some(row) => Ok(Some(from_value_ref(row.get_ref(0)?))),
                None => Ok(None),
            }
        })
    }

    fn query(&self, sql: &str, params: &Params) -> Result<u64> {
        self.instrumented(sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            bind(&mut stmt, params)?;
            let affected = stmt.raw_execute()?;
            Ok(affected as u64)
        })
    }

    fn insert(&self, table: &str, fields: &FieldMap) -> Result<i64> {
        let sql = if fields.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote_identifier(table))
        } else {
            let columns: Vec<String> = fields.keys().map(|k| quote_identifier(k)).collect();
            let marks = vec!["?"; fields.len()].join(",");
            format!(
                "INSERT INTO {} ({}) VALUES ({marks})",
                quote_identifier(table),
                columns.join(",")
            )
        };
        self.instrumented(&sql, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            for (i, value) in fields.values().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
            stmt.raw_execute()?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        self.instrumented(&sql, |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns = stmt
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        default: parse_default(row.get(4)?),
                        primary_key: row.get::<_, i64>(5)? > 0,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(columns)
        })
    }

    fn tables(&self) -> Result<Vec<String>> {
        let sql = "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
        self.instrumented(sql, |conn| {
            let mut stmt = conn.prepare(sql)?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(names)
        })
    }

    fn begin_transaction(&self) -> Result<()> {
        self.instrumented("BEGIN", |conn| conn.execute_batch("BEGIN"))
    }

    fn commit(&self) -> Result<()> {
        self.instrumented("COMMIT", |conn| conn.execute_batch("COMMIT"))
    }

    fn rollback(&self) -> Result<()> {
        self.instrumented("ROLLBACK", |conn| conn.execute_batch("ROLLBACK"))
    }

    fn in_transaction(&self) -> bool {
        self.conn
            .lock()
            .map(|conn| !conn.is_autocommit())
            .unwrap_or(false)
    }
}
