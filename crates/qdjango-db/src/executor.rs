//! Database executor trait and model CRUD operations.
//!
//! This module defines the [`DbExecutor`] trait that provides the minimal
//! blocking interface required by [`QuerySet`](crate::query::queryset::QuerySet)
//! evaluation and model CRUD operations. It also provides free functions to
//! save, delete and lazily fetch model instances.
//!
//! The `DbExecutor` trait is implemented by backend types (e.g.
//! `SqliteBackend`) in the `qdjango-db-backends` crate, and by
//! [`Database`](crate::connection::Database), which routes every call to the
//! calling thread's connection.

use qdjango_core::{DjangoError, DjangoResult};

use crate::model::{load_entity, Model};
use crate::query::compiler::{DatabaseBackendType, Query, SqlCompiler};
use crate::query::where_clause::{Operation, WhereExpression};
use crate::registry::{register_model, registry};
use crate::value::{FromValue, Value};

/// A decoded result row: one value per selected column, in column order.
pub type Row = Vec<Value>;

/// Minimal blocking database executor trait.
///
/// This is the bridge between the ORM layer (`qdjango-db`) and the concrete
/// database backends (`qdjango-db-backends`).
pub trait DbExecutor: Send + Sync {
    /// Returns the backend type for SQL compilation.
    fn backend_type(&self) -> DatabaseBackendType;

    /// Runs a SQL statement that does not return rows.
    /// Returns the number of rows affected.
    fn execute_sql(&self, sql: &str, params: &[Value]) -> DjangoResult<u64>;

    /// Runs a SQL query and returns all result rows.
    fn query(&self, sql: &str, params: &[Value]) -> DjangoResult<Vec<Row>>;

    /// Executes an INSERT and returns the generated row ID.
    fn insert_returning_id(&self, sql: &str, params: &[Value]) -> DjangoResult<Value>;

    /// Opens another connection to the same database, for use by another
    /// thread.
    fn try_clone(&self) -> DjangoResult<Box<dyn DbExecutor>>;
}

/// Logs a statement about to be executed.
pub fn log_statement(sql: &str, params: &[Value]) {
    tracing::debug!(target: "qdjango::sql", sql, ?params, "executing statement");
}

/// Runs a COUNT-style query and returns its single integer cell.
pub(crate) fn query_scalar(db: &dyn DbExecutor, sql: &str, params: &[Value]) -> DjangoResult<i64> {
    let rows = db.query(sql, params)?;
    let cell = rows
        .first()
        .and_then(|row| row.first())
        .ok_or_else(|| DjangoError::DatabaseError("Query returned no rows".to_string()))?;
    i64::from_value(cell)
}

/// A primary key counts as unset when it is NULL, or 0 for an
/// auto-incrementing key.
fn pk_is_set<M: Model>(pk: &Value) -> bool {
    match pk {
        Value::Null => false,
        Value::Int(0) => !M::meta().primary_key().field_type.is_auto(),
        _ => true,
    }
}

// ── Model CRUD free functions ──────────────────────────────────────────

/// Saves a model instance to the database.
///
/// If the primary key is set and a row with that key exists, performs an
/// UPDATE of all other fields. Otherwise performs an INSERT (leaving out an
/// auto-incrementing key) and stores the generated key on the instance.
///
/// # Errors
///
/// Returns an error if the database operation fails.
pub fn save_model<M: Model>(model: &mut M, db: &dyn DbExecutor) -> DjangoResult<()> {
    register_model::<M>();
    let meta = M::meta();
    let compiler = SqlCompiler::new(db.backend_type(), registry(), meta);
    let pk_field = meta.primary_key();
    let pk = model.pk();
    let values = model.field_values();

    if pk_is_set::<M>(&pk) {
        let mut exists_query = Query::new(meta.model_name);
        exists_query.where_clause = WhereExpression::new("pk", Operation::Equals, pk.clone());
        let (sql, params) =
            SqlCompiler::new(db.backend_type(), registry(), meta).compile_count(&exists_query)?;
        if query_scalar(db, &sql, &params)? > 0 {
            let fields: Vec<_> = values.into_iter().filter(|(f, _)| !f.primary_key).collect();
            if fields.is_empty() {
                return Ok(());
            }
            let (sql, params) = compiler.compile_update(&fields, &pk);
            db.execute_sql(&sql, &params)?;
            return Ok(());
        }
    }

    let auto_pk = pk_field.field_type.is_auto();
    let fields: Vec<_> = values
        .into_iter()
        .filter(|(f, _)| !(f.primary_key && auto_pk && !pk_is_set::<M>(&pk)))
        .collect();
    let (sql, params) = compiler.compile_insert(&fields);
    let generated = db.insert_returning_id(&sql, &params)?;
    if !pk_is_set::<M>(&pk) {
        model.set_pk(&generated)?;
    }
    Ok(())
}

/// Deletes a model instance from the database.
///
/// Issues a `DELETE ... WHERE pk = ?` statement. The model's primary key
/// must be set.
///
/// # Errors
///
/// Returns an error if the primary key is not set or the DELETE fails.
pub fn delete_model<M: Model>(model: &M, db: &dyn DbExecutor) -> DjangoResult<u64> {
    let pk = model.pk();
    if !pk_is_set::<M>(&pk) {
        return Err(DjangoError::DatabaseError(
            "Cannot delete a model without a primary key".to_string(),
        ));
    }
    register_model::<M>();
    let compiler = SqlCompiler::new(db.backend_type(), registry(), M::meta());
    let (sql, params) = compiler.compile_delete_pk(&pk);
    db.execute_sql(&sql, &params)
}

/// Loads the `R` whose primary key is `key`.
///
/// This is the lazy counterpart of `select_related`, for following a
/// foreign key of an instance fetched without it. Returns `Ok(None)` when
/// no such row exists.
///
/// # Errors
///
/// Returns an error if the query fails or the row cannot be decoded.
pub fn fetch_related<R: Model>(
    db: &dyn DbExecutor,
    key: impl Into<Value>,
) -> DjangoResult<Option<R>> {
    let key = key.into();
    if key.is_null() {
        return Ok(None);
    }
    register_model::<R>();
    let mut query = Query::new(R::model_name());
    query.where_clause = WhereExpression::new("pk", Operation::Equals, key);
    query.high_mark = 1;

    let compiled =
        SqlCompiler::new(db.backend_type(), registry(), R::meta()).compile_select(&query)?;
    let rows = db.query(&compiled.sql, &compiled.params)?;
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let mut entity = R::default();
    load_entity(&mut entity, row, 0, registry())?;
    Ok(Some(entity))
}
