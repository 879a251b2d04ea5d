//! Per-thread database connections.
//!
//! A [`Database`] wraps the connection it was created with. The thread that
//! created it uses that connection directly; any other thread obtains its
//! own copy through [`DbExecutor::try_clone`] on first use, and the copy is
//! dropped when that thread exits. Database connections are generally not
//! safe to share between threads, which is what this arrangement avoids.
//!
//! A process-wide default database serves querysets that were not bound to
//! one with `using`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::thread::{self, ThreadId};

use qdjango_core::{DjangoError, DjangoResult};

use crate::executor::{log_statement, DbExecutor, Row};
use crate::query::compiler::DatabaseBackendType;
use crate::value::Value;

struct Shared {
    owner: ThreadId,
    backend: DatabaseBackendType,
    primary: Arc<dyn DbExecutor>,
    copies: Mutex<HashMap<ThreadId, Arc<dyn DbExecutor>>>,
}

/// A handle to a database, cheap to clone and safe to share across threads.
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.shared.backend)
            .field("owner", &self.shared.owner)
            .field("connections", &self.connection_count())
            .finish()
    }
}

/// The databases the current thread holds copies for. Dropped, and the
/// copies released, when the thread exits.
struct ThreadConnections {
    thread: ThreadId,
    databases: RefCell<Vec<Weak<Shared>>>,
}

impl Drop for ThreadConnections {
    fn drop(&mut self) {
        for database in self.databases.get_mut().drain(..) {
            if let Some(shared) = database.upgrade() {
                shared
                    .copies
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&self.thread);
                tracing::debug!(thread = ?self.thread, "closed per-thread connection");
            }
        }
    }
}

thread_local! {
    static THREAD_CONNECTIONS: ThreadConnections = ThreadConnections {
        thread: thread::current().id(),
        databases: RefCell::new(Vec::new()),
    };
}

impl Database {
    /// Wraps `executor` as the primary connection, owned by the calling
    /// thread.
    pub fn new(executor: impl DbExecutor + 'static) -> Self {
        Self::from_arc(Arc::new(executor))
    }

    /// Wraps an already shared executor.
    pub fn from_arc(executor: Arc<dyn DbExecutor>) -> Self {
        Self {
            shared: Arc::new(Shared {
                owner: thread::current().id(),
                backend: executor.backend_type(),
                primary: executor,
                copies: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the connection for the calling thread, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if a new connection cannot be opened.
    pub fn executor(&self) -> DjangoResult<Arc<dyn DbExecutor>> {
        let current = thread::current().id();
        if current == self.shared.owner {
            return Ok(Arc::clone(&self.shared.primary));
        }

        let mut copies = self
            .shared
            .copies
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = copies.get(&current) {
            return Ok(Arc::clone(existing));
        }
        let copy: Arc<dyn DbExecutor> = Arc::from(self.shared.primary.try_clone()?);
        copies.insert(current, Arc::clone(&copy));
        drop(copies);

        let weak = Arc::downgrade(&self.shared);
        // Fails only while the thread is already tearing down its locals.
        let _ = THREAD_CONNECTIONS.try_with(|local| local.databases.borrow_mut().push(weak));
        tracing::debug!(thread = ?current, "opened per-thread connection");
        Ok(copy)
    }

    /// Returns the number of open connections: the primary plus one per
    /// other thread that used this database and is still running.
    pub fn connection_count(&self) -> usize {
        1 + self
            .shared
            .copies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if both handles refer to the same database.
    pub fn same_database(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl DbExecutor for Database {
    fn backend_type(&self) -> DatabaseBackendType {
        self.shared.backend
    }

    fn execute_sql(&self, sql: &str, params: &[Value]) -> DjangoResult<u64> {
        log_statement(sql, params);
        self.executor()?
            .execute_sql(sql, params)
            .inspect_err(|e| tracing::warn!(error = %e, sql, "statement failed"))
    }

    fn query(&self, sql: &str, params: &[Value]) -> DjangoResult<Vec<Row>> {
        log_statement(sql, params);
        self.executor()?
            .query(sql, params)
            .inspect_err(|e| tracing::warn!(error = %e, sql, "query failed"))
    }

    fn insert_returning_id(&self, sql: &str, params: &[Value]) -> DjangoResult<Value> {
        log_statement(sql, params);
        self.executor()?
            .insert_returning_id(sql, params)
            .inspect_err(|e| tracing::warn!(error = %e, sql, "insert failed"))
    }

    fn try_clone(&self) -> DjangoResult<Box<dyn DbExecutor>> {
        Ok(Box::new(self.clone()))
    }
}

// ── Default database ────────────────────────────────────────────────────

static DEFAULT_DATABASE: RwLock<Option<Database>> = RwLock::new(None);

/// Sets the database used by querysets without an explicit `using`.
pub fn set_default(database: Database) {
    *DEFAULT_DATABASE
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Some(database);
}

/// Removes the default database, returning it.
pub fn clear_default() -> Option<Database> {
    DEFAULT_DATABASE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
}

/// Returns the default database.
///
/// # Errors
///
/// Returns [`DjangoError::ImproperlyConfigured`] if none was set.
pub fn default_database() -> DjangoResult<Database> {
    DEFAULT_DATABASE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or_else(|| {
            DjangoError::ImproperlyConfigured(
                "No default database; call connection::set_default first".to_string(),
            )
        })
}
