//! SQL compilation.
//!
//! A [`SqlCompiler`] is created per statement against a base model. While it
//! renders a [`Query`] it resolves field paths such as `user__username`:
//! every foreign key hop becomes an `INNER JOIN` with a synthetic alias
//! (`T1`, `T2`, ... in first-reference order), cached by path prefix so the
//! same path never joins twice.
//!
//! Different backends use different placeholder styles:
//! - PostgreSQL: `$1, $2, $3, ...`
//! - SQLite / MySQL: `?, ?, ?, ...`

use qdjango_core::{DjangoError, DjangoResult};

use super::where_clause::{SqlRenderer, WhereExpression};
use crate::fields::FieldDef;
use crate::model::ModelMeta;
use crate::registry::ModelRegistry;
use crate::value::Value;

/// How many foreign key levels `select_related` follows.
pub const MAX_RELATED_DEPTH: usize = 5;

/// The database backend type, used to select SQL dialect differences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    /// PostgreSQL (uses `$1, $2, ...` placeholders).
    PostgreSQL,
    /// SQLite (uses `?` placeholders).
    SQLite,
    /// MySQL (uses `?` placeholders and backtick quoting).
    MySQL,
}

impl DatabaseBackendType {
    /// Returns the vendor name.
    pub const fn vendor(self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::SQLite => "sqlite",
            Self::MySQL => "mysql",
        }
    }

    /// Returns a parameter placeholder for the given 1-based index.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${index}"),
            Self::SQLite | Self::MySQL => "?".to_string(),
        }
    }

    /// Quotes an identifier (table, column or alias name).
    pub fn quote_name(self, name: &str) -> String {
        match self {
            Self::MySQL => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => format!("\"{}\"", name.replace('"', "\"\"")),
        }
    }

    /// The clause that lifts the row limit, needed where the dialect only
    /// accepts `OFFSET` after a `LIMIT`.
    pub const fn no_limit_sql(self) -> &'static str {
        match self {
            Self::SQLite => " LIMIT -1",
            Self::MySQL => " LIMIT 18446744073709551615",
            Self::PostgreSQL => "",
        }
    }

    /// The column-definition suffix for auto-incrementing keys.
    pub const fn auto_increment_sql(self) -> &'static str {
        match self {
            Self::SQLite => " AUTOINCREMENT",
            Self::MySQL => " AUTO_INCREMENT",
            Self::PostgreSQL => "",
        }
    }
}

/// A column ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    /// The field path to order by.
    pub path: String,
    /// Whether to sort in descending order.
    pub descending: bool,
}

impl OrderBy {
    /// Creates an ascending order.
    pub fn asc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: false,
        }
    }

    /// Creates a descending order.
    pub fn desc(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            descending: true,
        }
    }

    /// Parses an ordering key: a `-` prefix sorts descending, a `+` prefix
    /// (or none) ascending.
    pub fn parse(key: &str) -> Self {
        if let Some(path) = key.strip_prefix('-') {
            Self::desc(path)
        } else {
            Self::asc(key.strip_prefix('+').unwrap_or(key))
        }
    }
}

/// The immutable description of a query: which rows of which model, in
/// which order, through which pagination window.
///
/// `low_mark` and `high_mark` delimit the window as row offsets; a
/// `high_mark` of 0 means unbounded.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// The registered name of the base model.
    pub model: &'static str,
    /// The filter predicate.
    pub where_clause: WhereExpression,
    /// Ordering keys, applied in sequence.
    pub order_by: Vec<OrderBy>,
    /// Offset of the first row in the window.
    pub low_mark: usize,
    /// Offset one past the last row of the window, or 0 for unbounded.
    pub high_mark: usize,
    /// Whether rows of foreign-key targets are fetched with the base rows.
    pub select_related: bool,
}

impl Query {
    /// Creates a query over every row of `model`.
    pub fn new(model: &'static str) -> Self {
        Self {
            model,
            where_clause: WhereExpression::all(),
            order_by: Vec::new(),
            low_mark: 0,
            high_mark: 0,
            select_related: false,
        }
    }

    /// Returns `true` if a pagination window is set.
    pub const fn is_sliced(&self) -> bool {
        self.low_mark > 0 || self.high_mark > 0
    }
}

/// A column of a compiled SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedColumn {
    /// The field path this column answers to (`username`, `user__username`).
    pub path: String,
    /// The qualified SQL expression.
    pub sql: String,
}

/// A compiled SELECT statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSelect {
    /// The SQL text.
    pub sql: String,
    /// The values to bind, in placeholder order.
    pub params: Vec<Value>,
    /// The selected columns, in result order.
    pub columns: Vec<SelectedColumn>,
}

#[derive(Debug, Clone)]
struct Join {
    path: String,
    alias: String,
    model: &'static ModelMeta,
    condition: String,
}

/// Translates a [`Query`] into parameterized SQL for one statement.
pub struct SqlCompiler<'r> {
    backend: DatabaseBackendType,
    registry: &'r ModelRegistry,
    base: &'static ModelMeta,
    joins: Vec<Join>,
    placeholders: usize,
}

impl<'r> SqlCompiler<'r> {
    /// Creates a compiler whose base model is `base`.
    pub const fn new(
        backend: DatabaseBackendType,
        registry: &'r ModelRegistry,
        base: &'static ModelMeta,
    ) -> Self {
        Self {
            backend,
            registry,
            base,
            joins: Vec::new(),
            placeholders: 0,
        }
    }

    /// Creates a compiler for the registered model `model`.
    pub fn for_model(
        backend: DatabaseBackendType,
        registry: &'r ModelRegistry,
        model: &str,
    ) -> DjangoResult<Self> {
        Ok(Self::new(backend, registry, registry.resolve(model)?))
    }

    /// Returns the backend this compiler targets.
    pub const fn backend(&self) -> DatabaseBackendType {
        self.backend
    }

    fn quote(&self, name: &str) -> String {
        self.backend.quote_name(name)
    }

    fn base_reference(&self) -> String {
        self.quote(&self.base.db_table)
    }

    /// Resolves a field path to a qualified column expression.
    ///
    /// Each foreign key hop adds a join unless the same path prefix was
    /// already joined. The terminal segment may be a field name, a column
    /// name, or `pk`.
    pub fn resolve_column(&mut self, path: &str) -> DjangoResult<String> {
        let segments: Vec<&str> = path.split("__").collect();
        let Some((terminal, hops)) = segments.split_last() else {
            return Err(DjangoError::FieldError("Empty field path".to_string()));
        };

        let mut model = self.base;
        let mut reference = self.base_reference();
        let mut prefix = String::new();
        for hop in hops {
            let fk = model.foreign_key(hop).ok_or_else(|| {
                DjangoError::FieldError(format!(
                    "Cannot resolve keyword '{hop}' into a relation on model '{}'",
                    model.model_name
                ))
            })?;
            if !prefix.is_empty() {
                prefix.push_str("__");
            }
            prefix.push_str(hop);
            let (alias, target) = self.join(&prefix, &reference, fk)?;
            model = target;
            reference = alias;
        }

        let field = model.field(terminal).ok_or_else(|| {
            DjangoError::FieldError(format!(
                "Cannot resolve keyword '{terminal}' into field of model '{}'",
                model.model_name
            ))
        })?;
        Ok(format!("{reference}.{}", self.quote(&field.column)))
    }

    /// Returns the alias joined for `path`, adding the join on first use.
    fn join(
        &mut self,
        path: &str,
        referrer: &str,
        fk: &FieldDef,
    ) -> DjangoResult<(String, &'static ModelMeta)> {
        if let Some(join) = self.joins.iter().find(|j| j.path == path) {
            return Ok((join.alias.clone(), join.model));
        }

        let target_name = fk.related_model().unwrap_or_default();
        let target = self.registry.resolve(target_name)?;
        let alias = format!("T{}", self.joins.len() + 1);
        let condition = format!(
            "{alias}.{} = {referrer}.{}",
            self.quote(&target.primary_key().column),
            self.quote(&fk.column)
        );
        self.joins.push(Join {
            path: path.to_string(),
            alias: alias.clone(),
            model: target,
            condition,
        });
        Ok((alias, target))
    }

    /// Returns the number of joins accumulated so far.
    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    /// Renders the FROM clause: the base table followed by one
    /// `INNER JOIN` per joined path, in first-reference order.
    pub fn from_clause(&self) -> String {
        let mut sql = self.base_reference();
        for join in &self.joins {
            sql.push_str(&format!(
                " INNER JOIN {} {} ON {}",
                self.quote(&join.model.db_table),
                join.alias,
                join.condition
            ));
        }
        sql
    }

    /// Returns the base model's columns and, when `recurse` is set, the
    /// columns of the models reached through foreign keys, depth-first.
    pub fn select_columns(&mut self, recurse: bool) -> DjangoResult<Vec<SelectedColumn>> {
        let depth = if recurse { MAX_RELATED_DEPTH } else { 0 };
        let mut columns = Vec::new();
        let reference = self.base_reference();
        self.collect_columns(self.base, &reference, "", depth, &mut columns)?;
        Ok(columns)
    }

    fn collect_columns(
        &mut self,
        model: &'static ModelMeta,
        reference: &str,
        prefix: &str,
        depth: usize,
        out: &mut Vec<SelectedColumn>,
    ) -> DjangoResult<()> {
        for field in model.fields() {
            out.push(SelectedColumn {
                path: join_path(prefix, field.name),
                sql: format!("{reference}.{}", self.quote(&field.column)),
            });
        }
        if depth > 0 {
            for fk in model.foreign_keys() {
                let path = join_path(prefix, fk.name);
                let (alias, target) = self.join(&path, reference, fk)?;
                self.collect_columns(target, &alias, &path, depth - 1, out)?;
            }
        }
        Ok(())
    }

    /// Renders a predicate with positional placeholders and returns it with
    /// its bound values.
    pub fn compile_where(&mut self, expr: &WhereExpression) -> DjangoResult<(String, Vec<Value>)> {
        let sql = expr.render(self)?;
        let params = expr.values();
        debug_assert_eq!(
            self.placeholders,
            params.len(),
            "placeholder count must match bound values"
        );
        Ok((sql, params))
    }

    /// Renders the ORDER BY and LIMIT/OFFSET tail of a statement.
    pub fn order_and_limit(
        &mut self,
        order_by: &[OrderBy],
        low_mark: usize,
        high_mark: usize,
    ) -> DjangoResult<String> {
        let mut sql = String::new();
        if !order_by.is_empty() {
            let mut parts = Vec::with_capacity(order_by.len());
            for order in order_by {
                let column = self.resolve_column(&order.path)?;
                parts.push(format!(
                    "{column} {}",
                    if order.descending { "DESC" } else { "ASC" }
                ));
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&parts.join(", "));
        }
        sql.push_str(&self.limit_clause(low_mark, high_mark));
        Ok(sql)
    }

    fn limit_clause(&self, low_mark: usize, high_mark: usize) -> String {
        let mut sql = String::new();
        // Spans past the signed 64-bit range are left unbounded.
        let span = high_mark.saturating_sub(low_mark);
        let bounded = high_mark > 0 && i64::try_from(span).is_ok();
        if bounded {
            sql.push_str(&format!(" LIMIT {span}"));
        }
        if low_mark > 0 {
            if !bounded {
                sql.push_str(self.backend.no_limit_sql());
            }
            sql.push_str(&format!(" OFFSET {low_mark}"));
        }
        sql
    }

    /// Compiles the SELECT that materializes `query`.
    pub fn compile_select(&mut self, query: &Query) -> DjangoResult<CompiledSelect> {
        let columns = self.select_columns(query.select_related)?;
        let (where_sql, params) = self.compile_where(&query.where_clause)?;
        let tail = self.order_and_limit(&query.order_by, query.low_mark, query.high_mark)?;

        let column_sql: Vec<&str> = columns.iter().map(|c| c.sql.as_str()).collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            column_sql.join(", "),
            self.from_clause()
        );
        push_where(&mut sql, &where_sql);
        sql.push_str(&tail);
        Ok(CompiledSelect {
            sql,
            params,
            columns,
        })
    }

    /// Compiles a `COUNT(*)` over the rows `query` selects.
    ///
    /// A pagination window is honoured by counting a windowed sub-select.
    pub fn compile_count(&mut self, query: &Query) -> DjangoResult<(String, Vec<Value>)> {
        let (where_sql, params) = self.compile_where(&query.where_clause)?;

        if !query.is_sliced() {
            let mut sql = format!("SELECT COUNT(*) FROM {}", self.from_clause());
            push_where(&mut sql, &where_sql);
            return Ok((sql, params));
        }

        let pk = self.resolve_column("pk")?;
        let mut inner = format!("SELECT {pk} FROM {}", self.from_clause());
        push_where(&mut inner, &where_sql);
        inner.push_str(&self.limit_clause(query.low_mark, query.high_mark));
        let sql = format!(
            "SELECT COUNT(*) FROM ({inner}) AS {}",
            self.quote("_count")
        );
        Ok((sql, params))
    }

    /// Compiles a DELETE of the rows matched by `query`'s predicate.
    ///
    /// Predicates that reach other tables are applied through a
    /// `pk IN (SELECT ...)` sub-select.
    pub fn compile_delete(&mut self, query: &Query) -> DjangoResult<(String, Vec<Value>)> {
        let (where_sql, params) = self.compile_where(&query.where_clause)?;
        let table = self.base_reference();

        let mut sql = format!("DELETE FROM {table}");
        if self.joins.is_empty() {
            push_where(&mut sql, &where_sql);
        } else {
            let pk = self.quote(&self.base.primary_key().column);
            let mut inner = format!("SELECT {table}.{pk} FROM {}", self.from_clause());
            push_where(&mut inner, &where_sql);
            sql.push_str(&format!(" WHERE {pk} IN ({inner})"));
        }
        Ok((sql, params))
    }

    /// Compiles an INSERT of `(field, value)` pairs into the base table.
    pub fn compile_insert(&self, values: &[(&FieldDef, Value)]) -> (String, Vec<Value>) {
        let table = self.base_reference();
        if values.is_empty() {
            return (format!("INSERT INTO {table} DEFAULT VALUES"), Vec::new());
        }
        let columns: Vec<String> = values.iter().map(|(f, _)| self.quote(&f.column)).collect();
        let marks: Vec<String> = (1..=values.len())
            .map(|i| self.backend.placeholder(i))
            .collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            marks.join(", ")
        );
        (sql, values.iter().map(|(_, v)| v.clone()).collect())
    }

    /// Compiles an UPDATE of `(field, value)` pairs on the row whose
    /// primary key is `pk`.
    pub fn compile_update(&self, values: &[(&FieldDef, Value)], pk: &Value) -> (String, Vec<Value>) {
        let assignments: Vec<String> = values
            .iter()
            .enumerate()
            .map(|(i, (f, _))| {
                format!("{} = {}", self.quote(&f.column), self.backend.placeholder(i + 1))
            })
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.base_reference(),
            assignments.join(", "),
            self.quote(&self.base.primary_key().column),
            self.backend.placeholder(values.len() + 1)
        );
        let mut params: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
        params.push(pk.clone());
        (sql, params)
    }

    /// Compiles a DELETE of the row whose primary key is `pk`.
    pub fn compile_delete_pk(&self, pk: &Value) -> (String, Vec<Value>) {
        let sql = format!(
            "DELETE FROM {} WHERE {} = {}",
            self.base_reference(),
            self.quote(&self.base.primary_key().column),
            self.backend.placeholder(1)
        );
        (sql, vec![pk.clone()])
    }
}

impl SqlRenderer for SqlCompiler<'_> {
    fn column(&mut self, key: &str) -> DjangoResult<String> {
        self.resolve_column(key)
    }

    fn placeholder(&mut self, _named: &str) -> String {
        self.placeholders += 1;
        self.backend.placeholder(self.placeholders)
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}__{name}")
    }
}

fn push_where(sql: &mut String, where_sql: &str) {
    if !where_sql.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(where_sql);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;
    use crate::query::where_clause::Operation;
    use std::sync::LazyLock;

    static USER: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "User",
            "user",
            vec![
                FieldDef::new("username", FieldType::CharField).max_length(30),
                FieldDef::new("email", FieldType::CharField).max_length(75),
            ],
        )
    });

    static MESSAGE: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "Message",
            "message",
            vec![
                FieldDef::foreign_key("user", "User"),
                FieldDef::new("text", FieldType::TextField),
            ],
        )
    });

    static COMMENT: LazyLock<ModelMeta> = LazyLock::new(|| {
        ModelMeta::new(
            "Comment",
            "comment",
            vec![
                FieldDef::foreign_key("message", "Message"),
                FieldDef::foreign_key("author", "User"),
                FieldDef::new("body", FieldType::TextField),
            ],
        )
    });

    static REGISTRY: LazyLock<ModelRegistry> = LazyLock::new(|| {
        let registry = ModelRegistry::new();
        registry.register_meta(&USER);
        registry.register_meta(&MESSAGE);
        registry.register_meta(&COMMENT);
        registry
    });

    fn compiler(backend: DatabaseBackendType, model: &str) -> SqlCompiler<'static> {
        SqlCompiler::for_model(backend, &REGISTRY, model).unwrap()
    }

    fn sqlite(model: &str) -> SqlCompiler<'static> {
        compiler(DatabaseBackendType::SQLite, model)
    }

    fn pg(model: &str) -> SqlCompiler<'static> {
        compiler(DatabaseBackendType::PostgreSQL, model)
    }

    fn mysql(model: &str) -> SqlCompiler<'static> {
        compiler(DatabaseBackendType::MySQL, model)
    }

    fn eq(key: &str, value: impl Into<Value>) -> WhereExpression {
        WhereExpression::new(key, Operation::Equals, value)
    }

    // ── Dialect tests ────────────────────────────────────────────────

    #[test]
    fn test_quote_name() {
        assert_eq!(DatabaseBackendType::SQLite.quote_name("user"), "\"user\"");
        assert_eq!(DatabaseBackendType::PostgreSQL.quote_name("a\"b"), "\"a\"\"b\"");
        assert_eq!(DatabaseBackendType::MySQL.quote_name("user"), "`user`");
    }

    #[test]
    fn test_dialect_tokens() {
        assert_eq!(DatabaseBackendType::SQLite.no_limit_sql(), " LIMIT -1");
        assert_eq!(
            DatabaseBackendType::MySQL.no_limit_sql(),
            " LIMIT 18446744073709551615"
        );
        assert_eq!(DatabaseBackendType::PostgreSQL.no_limit_sql(), "");
        assert_eq!(DatabaseBackendType::SQLite.auto_increment_sql(), " AUTOINCREMENT");
        assert_eq!(DatabaseBackendType::MySQL.auto_increment_sql(), " AUTO_INCREMENT");
        assert_eq!(DatabaseBackendType::PostgreSQL.auto_increment_sql(), "");
    }

    #[test]
    fn test_order_by_parse() {
        assert_eq!(OrderBy::parse("-username"), OrderBy::desc("username"));
        assert_eq!(OrderBy::parse("+username"), OrderBy::asc("username"));
        assert_eq!(OrderBy::parse("username"), OrderBy::asc("username"));
    }

    // ── Column resolution ────────────────────────────────────────────

    #[test]
    fn test_resolve_local_column() {
        let mut c = sqlite("User");
        assert_eq!(c.resolve_column("username").unwrap(), "\"user\".\"username\"");
        assert_eq!(c.resolve_column("pk").unwrap(), "\"user\".\"id\"");
        assert_eq!(c.join_count(), 0);
        assert_eq!(c.from_clause(), "\"user\"");
    }

    #[test]
    fn test_resolve_foreign_key_column() {
        let mut c = sqlite("Message");
        assert_eq!(c.resolve_column("user").unwrap(), "\"message\".\"user_id\"");
        assert_eq!(c.resolve_column("user_id").unwrap(), "\"message\".\"user_id\"");
        assert_eq!(c.join_count(), 0);
    }

    #[test]
    fn test_resolve_one_hop() {
        let mut c = sqlite("Message");
        assert_eq!(c.resolve_column("user__username").unwrap(), "T1.\"username\"");
        assert_eq!(
            c.from_clause(),
            "\"message\" INNER JOIN \"user\" T1 ON T1.\"id\" = \"message\".\"user_id\""
        );
    }

    #[test]
    fn test_resolve_two_hops_and_reuse() {
        let mut c = sqlite("Comment");
        assert_eq!(
            c.resolve_column("message__user__username").unwrap(),
            "T2.\"username\""
        );
        assert_eq!(c.join_count(), 2);
        assert_eq!(c.resolve_column("message__user__email").unwrap(), "T2.\"email\"");
        assert_eq!(c.resolve_column("message__text").unwrap(), "T1.\"text\"");
        assert_eq!(c.join_count(), 2);
        assert_eq!(
            c.from_clause(),
            "\"comment\" INNER JOIN \"message\" T1 ON T1.\"id\" = \"comment\".\"message_id\" \
             INNER JOIN \"user\" T2 ON T2.\"id\" = T1.\"user_id\""
        );
        assert_eq!(c.from_clause().matches("INNER JOIN").count(), 2);
    }

    #[test]
    fn test_distinct_paths_to_same_table_get_distinct_aliases() {
        let mut c = sqlite("Comment");
        assert_eq!(c.resolve_column("author__username").unwrap(), "T1.\"username\"");
        assert_eq!(
            c.resolve_column("message__user__username").unwrap(),
            "T3.\"username\""
        );
        assert_eq!(c.join_count(), 3);
    }

    #[test]
    fn test_resolve_unknown_field() {
        let mut c = sqlite("User");
        let err = c.resolve_column("nickname").unwrap_err();
        assert!(matches!(err, DjangoError::FieldError(_)));
        let err = c.resolve_column("username__foo").unwrap_err();
        assert!(matches!(err, DjangoError::FieldError(_)));
    }

    #[test]
    fn test_for_unknown_model() {
        let result = SqlCompiler::for_model(DatabaseBackendType::SQLite, &REGISTRY, "Ghost");
        assert!(result.is_err());
    }

    // ── Select columns ───────────────────────────────────────────────

    #[test]
    fn test_select_columns_local() {
        let mut c = sqlite("Message");
        let cols = c.select_columns(false).unwrap();
        let paths: Vec<&str> = cols.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(paths, vec!["id", "user", "text"]);
        assert_eq!(cols[1].sql, "\"message\".\"user_id\"");
        assert_eq!(c.join_count(), 0);
    }

    #[test]
    fn test_select_columns_recursive() {
        let mut c = sqlite("Comment");
        let cols = c.select_columns(true).unwrap();
        let paths: Vec<&str> = cols.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "id",
                "message",
                "author",
                "body",
                "message__id",
                "message__user",
                "message__text",
                "message__user__id",
                "message__user__username",
                "message__user__email",
                "author__id",
                "author__username",
                "author__email",
            ]
        );
        assert_eq!(cols[8].sql, "T2.\"username\"");
        assert_eq!(cols[11].sql, "T3.\"username\"");
        assert_eq!(c.join_count(), 3);
    }

    #[test]
    fn test_select_related_shares_filter_joins() {
        let mut c = sqlite("Message");
        c.select_columns(true).unwrap();
        c.resolve_column("user__username").unwrap();
        assert_eq!(c.join_count(), 1);
    }

    // ── Order and limit ──────────────────────────────────────────────

    #[test]
    fn test_limit_variants() {
        let mut c = sqlite("User");
        assert_eq!(c.order_and_limit(&[], 0, 0).unwrap(), "");
        assert_eq!(c.order_and_limit(&[], 0, 5).unwrap(), " LIMIT 5");
        assert_eq!(c.order_and_limit(&[], 3, 6).unwrap(), " LIMIT 3 OFFSET 3");
        assert_eq!(c.order_and_limit(&[], 3, 0).unwrap(), " LIMIT -1 OFFSET 3");
        assert_eq!(c.order_and_limit(&[], 1, usize::MAX).unwrap(), " LIMIT -1 OFFSET 1");
        assert_eq!(c.order_and_limit(&[], 0, usize::MAX).unwrap(), "");
    }

    #[test]
    fn test_offset_without_limit_per_backend() {
        assert_eq!(
            mysql("User").order_and_limit(&[], 2, 0).unwrap(),
            " LIMIT 18446744073709551615 OFFSET 2"
        );
        assert_eq!(pg("User").order_and_limit(&[], 2, 0).unwrap(), " OFFSET 2");
    }

    #[test]
    fn test_order_by_clause() {
        let mut c = sqlite("Message");
        let sql = c
            .order_and_limit(&[OrderBy::desc("user__username"), OrderBy::asc("text")], 0, 2)
            .unwrap();
        assert_eq!(
            sql,
            " ORDER BY T1.\"username\" DESC, \"message\".\"text\" ASC LIMIT 2"
        );
        assert_eq!(c.join_count(), 1);
    }

    // ── Statements ───────────────────────────────────────────────────

    #[test]
    fn test_compile_select_with_filter() {
        let mut query = Query::new("User");
        query.where_clause = eq("username", "foouser");
        let compiled = sqlite("User").compile_select(&query).unwrap();
        assert_eq!(
            compiled.sql,
            "SELECT \"user\".\"id\", \"user\".\"username\", \"user\".\"email\" FROM \"user\" \
             WHERE \"user\".\"username\" = ?"
        );
        assert_eq!(compiled.params, vec![Value::from("foouser")]);
        assert_eq!(compiled.columns.len(), 3);
    }

    #[test]
    fn test_compile_select_pg_numbering() {
        let mut query = Query::new("User");
        query.where_clause = eq("username", "a")
            | WhereExpression::new("id", Operation::IsIn, Value::list([1_i64, 2]));
        let compiled = pg("User").compile_select(&query).unwrap();
        assert!(compiled
            .sql
            .ends_with("WHERE \"user\".\"username\" = $1 OR \"user\".\"id\" IN ($2, $3)"));
        assert_eq!(compiled.params.len(), 3);
    }

    #[test]
    fn test_compile_select_mysql_quoting() {
        let mut query = Query::new("User");
        query.where_clause = !eq("username", "foouser");
        let compiled = mysql("User").compile_select(&query).unwrap();
        assert!(compiled.sql.ends_with("WHERE `user`.`username` != ?"));
    }

    #[test]
    fn test_compile_select_none_and_all() {
        let mut query = Query::new("User");
        let compiled = sqlite("User").compile_select(&query).unwrap();
        assert!(!compiled.sql.contains("WHERE"));
        query.where_clause = WhereExpression::none();
        let compiled = sqlite("User").compile_select(&query).unwrap();
        assert!(compiled.sql.ends_with("WHERE 1 != 0"));
    }

    #[test]
    fn test_compile_select_related_filter_joins_once() {
        let mut query = Query::new("Message");
        query.where_clause = eq("user__username", "foouser");
        query.select_related = true;
        let compiled = sqlite("Message").compile_select(&query).unwrap();
        assert_eq!(compiled.sql.matches("INNER JOIN").count(), 1);
        assert!(compiled.sql.ends_with("WHERE T1.\"username\" = ?"));
        assert_eq!(compiled.columns.len(), 6);
    }

    #[test]
    fn test_compile_count_plain() {
        let mut query = Query::new("Message");
        query.where_clause = eq("user__username", "foouser");
        let (sql, params) = sqlite("Message").compile_count(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM \"message\" INNER JOIN \"user\" T1 \
             ON T1.\"id\" = \"message\".\"user_id\" WHERE T1.\"username\" = ?"
        );
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_compile_count_windowed() {
        let mut query = Query::new("User");
        query.low_mark = 1;
        query.high_mark = 4;
        let (sql, _) = sqlite("User").compile_count(&query).unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(*) FROM (SELECT \"user\".\"id\" FROM \"user\" LIMIT 3 OFFSET 1) \
             AS \"_count\""
        );
    }

    #[test]
    fn test_compile_delete_simple() {
        let mut query = Query::new("User");
        query.where_clause = WhereExpression::new(
            "username",
            Operation::IsIn,
            Value::list(["foouser", "baruser"]),
        );
        let (sql, params) = sqlite("User").compile_delete(&query).unwrap();
        assert_eq!(
            sql,
            "DELETE FROM \"user\" WHERE \"user\".\"username\" IN (?, ?)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_compile_delete_through_join() {
        let mut query = Query::new("Message");
        query.where_clause = eq("user__username", "foouser");
        let (sql, _) = sqlite("Message").compile_delete(&query).unwrap();
        assert_eq!(
            sql,
            "DELETE FROM \"message\" WHERE \"id\" IN (SELECT \"message\".\"id\" FROM \"message\" \
             INNER JOIN \"user\" T1 ON T1.\"id\" = \"message\".\"user_id\" \
             WHERE T1.\"username\" = ?)"
        );
    }

    #[test]
    fn test_compile_insert_update_delete_pk() {
        let c = pg("User");
        let username = USER.field("username").unwrap();
        let email = USER.field("email").unwrap();
        let values = vec![(username, Value::from("a")), (email, Value::from("a@x"))];

        let (sql, params) = c.compile_insert(&values);
        assert_eq!(
            sql,
            "INSERT INTO \"user\" (\"username\", \"email\") VALUES ($1, $2)"
        );
        assert_eq!(params.len(), 2);

        let (sql, params) = c.compile_update(&values, &Value::Int(9));
        assert_eq!(
            sql,
            "UPDATE \"user\" SET \"username\" = $1, \"email\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(params.last(), Some(&Value::Int(9)));

        let (sql, _) = c.compile_delete_pk(&Value::Int(9));
        assert_eq!(sql, "DELETE FROM \"user\" WHERE \"id\" = $1");
    }

    #[test]
    fn test_compile_insert_default_values() {
        let (sql, params) = sqlite("User").compile_insert(&[]);
        assert_eq!(sql, "INSERT INTO \"user\" DEFAULT VALUES");
        assert!(params.is_empty());
    }
}
