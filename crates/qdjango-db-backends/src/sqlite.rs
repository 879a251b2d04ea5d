//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`] which implements the
//! [`DbExecutor`] trait over a single `rusqlite` connection.
//!
//! Features:
//! - WAL mode enabled for file databases
//! - In-memory databases are opened through a uniquely named shared-cache
//!   URI, so connections cloned for other threads see the same data
//! - Simple `Mutex`-based concurrency control

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use qdjango_core::{DjangoError, DjangoResult};
use qdjango_db::executor::{DbExecutor, Row};
use qdjango_db::query::compiler::DatabaseBackendType;
use qdjango_db::value::Value;
use rusqlite::types::ValueRef;

const MEMORY: &str = ":memory:";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

static MEMORY_DATABASES: AtomicUsize = AtomicUsize::new(0);

/// A SQLite database backend.
pub struct SqliteBackend {
    /// The path given when opening (or ":memory:").
    name: String,
    /// What was actually passed to SQLite: the path, or a shared-cache URI.
    target: String,
    options: HashMap<String, String>,
    conn: Mutex<rusqlite::Connection>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("name", &self.name)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens a SQLite database at the given path.
    ///
    /// If the path is `:memory:`, a new in-memory database is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: &str) -> DjangoResult<Self> {
        Self::open_with_options(path, &HashMap::new())
    }

    /// Opens a SQLite database with connection options.
    ///
    /// Recognized options: `busy_timeout` (milliseconds, default 5000) and
    /// `foreign_keys` (`on`/`off`, default `on`).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or an option is
    /// malformed.
    pub fn open_with_options(path: &str, options: &HashMap<String, String>) -> DjangoResult<Self> {
        let target = if path == MEMORY {
            let n = MEMORY_DATABASES.fetch_add(1, Ordering::Relaxed);
            format!("file:qdjango_mem_{}_{n}?mode=memory&cache=shared", std::process::id())
        } else {
            path.to_string()
        };
        let conn = Self::connect(&target, path == MEMORY, options)?;
        Ok(Self {
            name: path.to_string(),
            target,
            options: options.clone(),
            conn: Mutex::new(conn),
        })
    }

    /// Opens a new in-memory database (convenience constructor).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> DjangoResult<Self> {
        Self::open(MEMORY)
    }

    fn connect(
        target: &str,
        in_memory: bool,
        options: &HashMap<String, String>,
    ) -> DjangoResult<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(target)
            .map_err(|e| DjangoError::OperationalError(format!("SQLite open failed: {e}")))?;

        let busy_timeout = match options.get("busy_timeout") {
            Some(ms) => ms.parse::<u64>().map_err(|_| {
                DjangoError::ImproperlyConfigured(format!("Invalid busy_timeout '{ms}'"))
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };
        conn.busy_timeout(Duration::from_millis(busy_timeout))
            .map_err(|e| DjangoError::OperationalError(format!("Failed to set busy timeout: {e}")))?;

        let foreign_keys = options
            .get("foreign_keys")
            .map_or(true, |v| !v.eq_ignore_ascii_case("off"));
        conn.pragma_update(None, "foreign_keys", foreign_keys)
            .map_err(|e| DjangoError::OperationalError(format!("Failed to set pragmas: {e}")))?;
        if !in_memory {
            // journal_mode answers with the resulting mode.
            conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(()))
                .map_err(|e| {
                    DjangoError::OperationalError(format!("Failed to enable WAL: {e}"))
                })?;
        }

        tracing::debug!(uri = target, "opened sqlite connection");
        Ok(conn)
    }

    /// Returns the database path (or ":memory:").
    pub fn path(&self) -> &str {
        &self.name
    }

    /// Returns `true` for an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.name == MEMORY
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Binds ORM `Value` types to a `rusqlite` statement.
    fn bind_params(stmt: &mut rusqlite::Statement<'_>, params: &[Value]) -> DjangoResult<()> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::Bytes(b) => stmt.raw_bind_parameter(idx, b.as_slice()),
                Value::Date(_) | Value::DateTime(_) | Value::Time(_) => {
                    stmt.raw_bind_parameter(idx, param.to_string().as_str())
                }
                Value::List(_) => {
                    return Err(DjangoError::DatabaseError(format!(
                        "Cannot bind a list to parameter {idx}"
                    )))
                }
            }
            .map_err(|e| DjangoError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, width: usize) -> Row {
        (0..width)
            .map(|i| match sqlite_row.get_ref(i).unwrap_or(ValueRef::Null) {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(v) => Value::Int(v),
                ValueRef::Real(v) => Value::Float(v),
                ValueRef::Text(b) => Value::String(String::from_utf8_lossy(b).to_string()),
                ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
            })
            .collect()
    }

    fn run(conn: &rusqlite::Connection, sql: &str, params: &[Value]) -> DjangoResult<u64> {
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        Self::bind_params(&mut stmt, params)?;
        let count = stmt.raw_execute().map_err(map_error)?;
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}

/// Maps a driver error onto the framework error kinds.
fn map_error(e: rusqlite::Error) -> DjangoError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) => match err.code {
            rusqlite::ErrorCode::ConstraintViolation => DjangoError::IntegrityError(e.to_string()),
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                DjangoError::OperationalError(e.to_string())
            }
            _ => DjangoError::DatabaseError(e.to_string()),
        },
        _ => DjangoError::DatabaseError(e.to_string()),
    }
}

impl DbExecutor for SqliteBackend {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::SQLite
    }

    fn execute_sql(&self, sql: &str, params: &[Value]) -> DjangoResult<u64> {
        Self::run(&self.lock(), sql, params)
    }

    fn query(&self, sql: &str, params: &[Value]) -> DjangoResult<Vec<Row>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(sql).map_err(map_error)?;
        let width = stmt.column_count();
        Self::bind_params(&mut stmt, params)?;

        let mut raw_rows = stmt.raw_query();
        let mut rows = Vec::new();
        while let Some(row) = raw_rows.next().map_err(map_error)? {
            rows.push(Self::convert_row(row, width));
        }
        Ok(rows)
    }

    fn insert_returning_id(&self, sql: &str, params: &[Value]) -> DjangoResult<Value> {
        let conn = self.lock();
        Self::run(&conn, sql, params)?;
        Ok(Value::Int(conn.last_insert_rowid()))
    }

    fn try_clone(&self) -> DjangoResult<Box<dyn DbExecutor>> {
        let conn = Self::connect(&self.target, self.is_memory(), &self.options)?;
        Ok(Box::new(Self {
            name: self.name.clone(),
            target: self.target.clone(),
            options: self.options.clone(),
            conn: Mutex::new(conn),
        }))
    }
}
