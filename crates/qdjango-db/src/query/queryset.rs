//! QuerySet and Manager for building and executing database queries.
//!
//! A [`QuerySet`] is a lazy, immutable query description. Refining methods
//! (`filter`, `exclude`, `order_by`, `limit`, `select_related`) return new
//! querysets that share nothing mutable with their source. Rows are fetched
//! on the first method that needs them and cached in the queryset value;
//! `remove` clears the cache.
//!
//! The [`Manager`] is the entry point for accessing querysets on a model.
//!
//! # Examples
//!
//! ```ignore
//! let users = Manager::<User>::new().using(&db);
//! let mut active = users
//!     .filter(WhereExpression::new("is_active", Operation::Equals, true))
//!     .order_by(&["-date_joined"])
//!     .limit(0, Some(10));
//! for user in active.entities()? {
//!     println!("{}", user.username);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use qdjango_core::logging::query_span;
use qdjango_core::{DjangoError, DjangoResult};

use super::compiler::{
    DatabaseBackendType, OrderBy, Query, SelectedColumn, SqlCompiler, MAX_RELATED_DEPTH,
};
use super::where_clause::WhereExpression;
use crate::connection::{default_database, Database};
use crate::executor::{query_scalar, DbExecutor, Row};
use crate::model::{load_entity, Model, ModelMeta};
use crate::registry::{register_model, registry};
use crate::value::Value;

const SLICED_FILTER: &str = "Cannot filter a query once a slice has been taken.";
const SLICED_ORDER: &str = "Cannot reorder a query once a slice has been taken.";

/// The entry point for model-level query operations.
///
/// The `Manager` itself does not hold any query state; it simply creates
/// fresh `QuerySet` instances, bound to its database if one was given.
#[derive(Debug)]
pub struct Manager<M: Model> {
    _phantom: PhantomData<fn() -> M>,
    using: Option<Database>,
}

impl<M: Model> Default for Manager<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Manager<M> {
    /// Creates a new manager.
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
            using: None,
        }
    }

    /// Binds the manager's querysets to `db`.
    #[must_use]
    pub fn using(mut self, db: &Database) -> Self {
        self.using = Some(db.clone());
        self
    }

    /// Returns a new `QuerySet` that returns all objects.
    pub fn all(&self) -> QuerySet<M> {
        QuerySet::new(self.using.clone())
    }

    /// Returns a new `QuerySet` with the given filter applied.
    pub fn filter(&self, predicate: WhereExpression) -> QuerySet<M> {
        self.all().filter(predicate)
    }

    /// Returns a new `QuerySet` with the given exclusion applied.
    pub fn exclude(&self, predicate: WhereExpression) -> QuerySet<M> {
        self.all().exclude(predicate)
    }

    /// Returns the single object matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, predicate: WhereExpression) -> DjangoResult<Option<M>> {
        self.all().get(predicate)
    }
}

/// Fetched rows together with the column layout that produced them.
#[derive(Debug, Clone, Default)]
struct ResultCache {
    columns: Vec<SelectedColumn>,
    rows: Vec<Row>,
}

/// A lazy, composable database query.
pub struct QuerySet<M: Model> {
    model: PhantomData<fn() -> M>,
    query: Arc<Query>,
    using: Option<Database>,
    cache: Option<ResultCache>,
}

impl<M: Model> Clone for QuerySet<M> {
    /// Clones the query description; the copy starts without cached rows.
    fn clone(&self) -> Self {
        self.derive(Arc::clone(&self.query))
    }
}

impl<M: Model> fmt::Debug for QuerySet<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySet")
            .field("query", &self.query)
            .field("cached_rows", &self.cache.as_ref().map(|c| c.rows.len()))
            .finish_non_exhaustive()
    }
}

impl<M: Model> QuerySet<M> {
    /// Creates a queryset over every row of `M`. Registers `M` (and its
    /// related models) with the model registry.
    pub fn new(using: Option<Database>) -> Self {
        register_model::<M>();
        Self {
            model: PhantomData,
            query: Arc::new(Query::new(M::model_name())),
            using,
            cache: None,
        }
    }

    fn derive(&self, query: Arc<Query>) -> Self {
        Self {
            model: PhantomData,
            query,
            using: self.using.clone(),
            cache: None,
        }
    }

    fn refine(&self, change: impl FnOnce(&mut Query)) -> Self {
        let mut query = (*self.query).clone();
        change(&mut query);
        self.derive(Arc::new(query))
    }

    // ── Refinement ──────────────────────────────────────────────────

    /// Returns a copy of this queryset.
    #[must_use]
    pub fn all(&self) -> Self {
        self.clone()
    }

    /// Returns a queryset bound to `db`.
    #[must_use]
    pub fn using(&self, db: &Database) -> Self {
        let mut qs = self.clone();
        qs.using = Some(db.clone());
        qs
    }

    /// Returns a queryset restricted to rows matching `predicate`.
    ///
    /// # Panics
    ///
    /// Panics if a pagination window has been set with [`limit`](Self::limit).
    #[must_use]
    pub fn filter(&self, predicate: WhereExpression) -> Self {
        assert!(!self.query.is_sliced(), "{SLICED_FILTER}");
        self.refine(|q| q.where_clause = std::mem::take(&mut q.where_clause).and(predicate))
    }

    /// Returns a queryset excluding rows matching `predicate`.
    ///
    /// # Panics
    ///
    /// Panics if a pagination window has been set with [`limit`](Self::limit).
    #[must_use]
    pub fn exclude(&self, predicate: WhereExpression) -> Self {
        assert!(!self.query.is_sliced(), "{SLICED_FILTER}");
        self.filter(predicate.negate())
    }

    /// Returns a queryset ordered by `keys`, appended to any existing
    /// ordering. A key prefixed with `-` sorts descending.
    ///
    /// # Panics
    ///
    /// Panics if a pagination window has been set with [`limit`](Self::limit).
    #[must_use]
    pub fn order_by(&self, keys: &[&str]) -> Self {
        assert!(!self.query.is_sliced(), "{SLICED_ORDER}");
        self.refine(|q| q.order_by.extend(keys.iter().map(|k| OrderBy::parse(k))))
    }

    /// Returns a queryset narrowed to `count` rows starting `offset` rows
    /// into the current window. `None` (or 0) leaves the end unbounded
    /// within the current window.
    #[must_use]
    pub fn limit(&self, offset: usize, count: Option<usize>) -> Self {
        self.refine(|q| {
            let low = q.low_mark.saturating_add(offset);
            let mut high = match count {
                Some(count) if count > 0 => low.saturating_add(count),
                _ => 0,
            };
            if q.high_mark > 0 {
                if low >= q.high_mark {
                    high = low;
                } else if high == 0 || high > q.high_mark {
                    high = q.high_mark;
                }
            }
            q.low_mark = low;
            q.high_mark = high;
        })
    }

    /// Returns a queryset that also fetches the objects behind foreign
    /// keys, following up to `MAX_RELATED_DEPTH` levels.
    #[must_use]
    pub fn select_related(&self) -> Self {
        self.refine(|q| q.select_related = true)
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Returns the query description.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the filter predicate.
    pub fn where_clause(&self) -> &WhereExpression {
        &self.query.where_clause
    }

    /// Returns `true` if rows have been fetched and not invalidated.
    pub const fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    fn compiler(backend: DatabaseBackendType) -> SqlCompiler<'static> {
        SqlCompiler::new(backend, registry(), M::meta())
    }

    /// Compiles the SELECT this queryset would run.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::FieldError`] for unresolvable field paths.
    pub fn to_sql(&self, backend: DatabaseBackendType) -> DjangoResult<(String, Vec<Value>)> {
        let compiled = Self::compiler(backend).compile_select(&self.query)?;
        Ok((compiled.sql, compiled.params))
    }

    /// Compiles the COUNT query this queryset would run.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::FieldError`] for unresolvable field paths.
    pub fn count_sql(&self, backend: DatabaseBackendType) -> DjangoResult<(String, Vec<Value>)> {
        Self::compiler(backend).compile_count(&self.query)
    }

    /// Compiles the DELETE this queryset would run.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::FieldError`] for unresolvable field paths.
    pub fn delete_sql(&self, backend: DatabaseBackendType) -> DjangoResult<(String, Vec<Value>)> {
        Self::compiler(backend).compile_delete(&self.query)
    }

    // ── Evaluation ──────────────────────────────────────────────────

    fn database(&self) -> DjangoResult<Database> {
        match &self.using {
            Some(db) => Ok(db.clone()),
            None => default_database(),
        }
    }

    fn related_depth(&self) -> usize {
        if self.query.select_related {
            MAX_RELATED_DEPTH
        } else {
            0
        }
    }

    fn load(&self) -> DjangoResult<ResultCache> {
        let span = query_span(M::model_name());
        let _entered = span.enter();

        let db = self.database()?;
        let compiled = Self::compiler(db.backend_type()).compile_select(&self.query)?;
        let rows = if self.query.where_clause.is_none() {
            Vec::new()
        } else {
            db.query(&compiled.sql, &compiled.params)?
        };
        tracing::debug!(rows = rows.len(), "fetched rows");
        Ok(ResultCache {
            columns: compiled.columns,
            rows,
        })
    }

    fn fetch(&mut self) -> DjangoResult<&ResultCache> {
        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => self.load()?,
        };
        Ok(self.cache.insert(cache))
    }

    fn entity(&self, row: &[Value]) -> DjangoResult<M> {
        let mut entity = M::default();
        load_entity(&mut entity, row, self.related_depth(), registry())?;
        Ok(entity)
    }

    /// Returns the number of matching rows.
    ///
    /// Uses the cached rows when present, else runs a COUNT query that
    /// honours the predicate and window.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self) -> DjangoResult<usize> {
        if self.query.where_clause.is_none() {
            return Ok(0);
        }
        if let Some(cache) = &self.cache {
            return Ok(cache.rows.len());
        }

        let span = query_span(M::model_name());
        let _entered = span.enter();
        let db = self.database()?;
        let (sql, params) = Self::compiler(db.backend_type()).compile_count(&self.query)?;
        let count = query_scalar(&db, &sql, &params)?;
        usize::try_from(count)
            .map_err(|_| DjangoError::DatabaseError(format!("Invalid row count {count}")))
    }

    /// Fetches the rows if needed and returns how many there are.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn size(&mut self) -> DjangoResult<usize> {
        Ok(self.fetch()?.rows.len())
    }

    /// Returns the object at `index` in the fetched rows, or `None` when
    /// out of bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub fn at(&mut self, index: usize) -> DjangoResult<Option<M>> {
        let len = self.fetch()?.rows.len();
        if index >= len {
            tracing::warn!(
                model = M::model_name(),
                index,
                len,
                "queryset index out of bounds"
            );
            return Ok(None);
        }
        let row = self.fetch()?.rows[index].clone();
        self.entity(&row).map(Some)
    }

    /// Returns every matching object.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn entities(&mut self) -> DjangoResult<Vec<M>> {
        let depth = self.related_depth();
        let cache = self.fetch()?;
        cache
            .rows
            .iter()
            .map(|row| {
                let mut entity = M::default();
                load_entity(&mut entity, row, depth, registry())?;
                Ok(entity)
            })
            .collect()
    }

    /// Returns the single object matching `predicate`, or `None` when zero
    /// or several objects match.
    ///
    /// # Panics
    ///
    /// Panics if a pagination window has been set with [`limit`](Self::limit).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, predicate: WhereExpression) -> DjangoResult<Option<M>> {
        let mut qs = self.filter(predicate).limit(0, Some(2));
        if qs.size()? == 1 {
            qs.at(0)
        } else {
            Ok(None)
        }
    }

    /// Deletes the matching rows and returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::NotSupported`] without touching the database
    /// if a pagination window is set, or an error if the DELETE fails.
    pub fn remove(&mut self) -> DjangoResult<u64> {
        if self.query.where_clause.is_none() {
            return Ok(0);
        }
        if self.query.is_sliced() {
            tracing::warn!(
                model = M::model_name(),
                "refusing to delete through a limited queryset"
            );
            return Err(DjangoError::NotSupported(
                "Cannot delete from a queryset with a limit or offset".to_string(),
            ));
        }

        let span = query_span(M::model_name());
        let _entered = span.enter();
        let db = self.database()?;
        let (sql, params) = Self::compiler(db.backend_type()).compile_delete(&self.query)?;
        let deleted = db.execute_sql(&sql, &params)?;
        self.cache = None;
        Ok(deleted)
    }

    /// Returns the matching rows as maps from field name to value.
    ///
    /// An empty `fields` slice selects every local field of the model.
    /// Paths into related models are allowed when `select_related` is set.
    ///
    /// # Panics
    ///
    /// Panics if a field name does not resolve to a fetched column.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn values(&mut self, fields: &[&str]) -> DjangoResult<Vec<BTreeMap<String, Value>>> {
        let (names, indices) = self.projection(fields)?;
        let cache = self.fetch()?;
        Ok(cache
            .rows
            .iter()
            .map(|row| {
                names
                    .iter()
                    .zip(&indices)
                    .map(|(name, &i)| (name.clone(), row[i].clone()))
                    .collect()
            })
            .collect())
    }

    /// Returns the matching rows as value lists, in `fields` order.
    ///
    /// An empty `fields` slice selects every local field of the model.
    ///
    /// # Panics
    ///
    /// Panics if a field name does not resolve to a fetched column.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn values_list(&mut self, fields: &[&str]) -> DjangoResult<Vec<Vec<Value>>> {
        let (_, indices) = self.projection(fields)?;
        let cache = self.fetch()?;
        Ok(cache
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect())
    }

    /// Maps requested field names to output names and column positions.
    ///
    /// A related path that resolves but was not fetched is a
    /// [`DjangoError::FieldError`]; a name that does not resolve panics.
    fn projection(&mut self, fields: &[&str]) -> DjangoResult<(Vec<String>, Vec<usize>)> {
        let names: Vec<String> = if fields.is_empty() {
            M::meta().fields().iter().map(|f| f.name.to_string()).collect()
        } else {
            fields.iter().map(ToString::to_string).collect()
        };
        let paths: Vec<String> = names
            .iter()
            .map(|name| {
                canonical_path(M::meta(), name).unwrap_or_else(|| {
                    panic!("Unknown field '{name}' for model '{}'", M::model_name())
                })
            })
            .collect();
        let cache = self.fetch()?;
        let indices = names
            .iter()
            .zip(&paths)
            .map(|(name, path)| {
                cache
                    .columns
                    .iter()
                    .position(|c| &c.path == path)
                    .ok_or_else(|| {
                        DjangoError::FieldError(format!(
                            "Field '{name}' of model '{}' is not fetched; use select_related()",
                            M::model_name()
                        ))
                    })
            })
            .collect::<DjangoResult<_>>()?;
        Ok((names, indices))
    }
}

/// Rewrites a field path in terms of field names (`user_id` becomes
/// `user`, `pk` the primary key's name), matching the compiler's column
/// paths.
fn canonical_path(base: &'static ModelMeta, path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split("__").collect();
    let (terminal, hops) = segments.split_last()?;
    let mut model = base;
    let mut canonical = Vec::with_capacity(segments.len());
    for hop in hops {
        let fk = model.foreign_key(hop)?;
        canonical.push(fk.name);
        model = registry().get(fk.related_model()?)?;
    }
    canonical.push(model.field(terminal)?.name);
    Some(canonical.join("__"))
}
