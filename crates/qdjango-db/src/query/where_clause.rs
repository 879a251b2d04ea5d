//! Predicate trees for filtering querysets.
//!
//! A [`WhereExpression`] is either a leaf comparison (`username = ?`) or a
//! binary AND/OR node. Expressions are immutable values: negation and
//! combination build new trees. Combination absorbs the trivial predicates
//! [`WhereExpression::all`] and [`WhereExpression::none`], so filtering a
//! fresh queryset by `P` stores exactly `P`.
//!
//! Rendering and value binding walk the tree in the same order, which is
//! what keeps positional placeholders and bound values aligned.
//!
//! # Examples
//!
//! ```
//! use qdjango_db::query::where_clause::{Operation, WhereExpression};
//! use qdjango_db::value::Value;
//!
//! let foo = WhereExpression::new("username", Operation::Equals, "foouser");
//! let bar = WhereExpression::new("username", Operation::Equals, "baruser");
//!
//! let either = foo.clone() | bar;
//! assert_eq!(either.sql(), "username = :username OR username = :username");
//!
//! assert_eq!((!foo).sql(), "username != :username");
//! ```

use std::ops;

use qdjango_core::DjangoResult;

use crate::value::Value;

/// The comparison a leaf applies between its field and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// No comparison: the leaf stands for "all rows" (or "no rows" when negated).
    None,
    /// `field = value`.
    Equals,
    /// `field != value`.
    NotEquals,
    /// `field > value`.
    GreaterThan,
    /// `field < value`.
    LessThan,
    /// `field >= value`.
    GreaterOrEquals,
    /// `field <= value`.
    LessOrEquals,
    /// `field LIKE 'value%'`.
    StartsWith,
    /// `field LIKE '%value'`.
    EndsWith,
    /// `field LIKE '%value%'`.
    Contains,
    /// `field IN (values...)`.
    IsIn,
}

impl Operation {
    /// Returns the SQL operator for this comparison.
    pub const fn sql_operator(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Equals => "=",
            Self::NotEquals => "!=",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterOrEquals => ">=",
            Self::LessOrEquals => "<=",
            Self::StartsWith | Self::EndsWith | Self::Contains => "LIKE",
            Self::IsIn => "IN",
        }
    }

    /// The operator that selects exactly the complementary rows, for the
    /// operations that have one.
    const fn complement(self) -> Option<Self> {
        match self {
            Self::Equals => Some(Self::NotEquals),
            Self::NotEquals => Some(Self::Equals),
            Self::GreaterThan => Some(Self::LessOrEquals),
            Self::LessOrEquals => Some(Self::GreaterThan),
            Self::LessThan => Some(Self::GreaterOrEquals),
            Self::GreaterOrEquals => Some(Self::LessThan),
            Self::None | Self::StartsWith | Self::EndsWith | Self::Contains | Self::IsIn => None,
        }
    }

    const fn is_like(self) -> bool {
        matches!(self, Self::StartsWith | Self::EndsWith | Self::Contains)
    }
}

/// How the two children of a combined expression are joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Combinator {
    /// Both children must hold.
    And,
    /// Either child must hold.
    Or,
}

impl Combinator {
    /// Returns the separator placed between the rendered children.
    pub const fn separator(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// A node of the predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpression {
    /// A single comparison between a field path and a value.
    Leaf {
        /// The field path, e.g. `username` or `user__username`.
        key: String,
        /// The comparison applied.
        operation: Operation,
        /// The operand; a [`Value::List`] for [`Operation::IsIn`].
        value: Value,
        /// The named placeholder derived from `key`.
        placeholder: String,
        /// Whether the rendered comparison is wrapped in `NOT (...)`.
        negate: bool,
    },
    /// Two sub-expressions joined by AND or OR.
    Combine {
        /// The joining operator.
        combinator: Combinator,
        /// Left and right operands, in rendering order.
        children: Box<[WhereExpression; 2]>,
        /// Whether the rendered group is wrapped in `NOT (...)`.
        negate: bool,
    },
}

impl Default for WhereExpression {
    fn default() -> Self {
        Self::all()
    }
}

/// Derives the named placeholder for a field path: `:` followed by the path
/// with every character that cannot appear in an identifier replaced by `_`.
///
/// ```
/// use qdjango_db::query::where_clause::placeholder_for;
///
/// assert_eq!(placeholder_for("user__username"), ":user__username");
/// assert_eq!(placeholder_for("\"user\".\"name\""), ":_user___name_");
/// ```
pub fn placeholder_for(key: &str) -> String {
    let mut placeholder = String::with_capacity(key.len() + 1);
    placeholder.push(':');
    placeholder.extend(
        key.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }),
    );
    placeholder
}

/// Receives the pieces of a predicate as it is rendered to SQL.
///
/// The query compiler implements this to qualify field paths with table
/// aliases and to emit the backend's positional placeholders.
pub trait SqlRenderer {
    /// Returns the SQL column expression for a field path.
    fn column(&mut self, key: &str) -> DjangoResult<String>;

    /// Returns the placeholder text for the next bound value. `named` is the
    /// leaf's own placeholder.
    fn placeholder(&mut self, named: &str) -> String;
}

/// Renders keys verbatim and uses the leaves' named placeholders.
struct NamedRenderer;

impl SqlRenderer for NamedRenderer {
    fn column(&mut self, key: &str) -> DjangoResult<String> {
        Ok(key.to_string())
    }

    fn placeholder(&mut self, named: &str) -> String {
        named.to_string()
    }
}

impl WhereExpression {
    /// Creates a leaf comparing `key` with `value`.
    pub fn new(key: impl Into<String>, operation: Operation, value: impl Into<Value>) -> Self {
        let key = key.into();
        Self::Leaf {
            placeholder: placeholder_for(&key),
            key,
            operation,
            value: value.into(),
            negate: false,
        }
    }

    /// The predicate that matches every row. Renders as empty SQL.
    pub const fn all() -> Self {
        Self::Leaf {
            key: String::new(),
            operation: Operation::None,
            value: Value::Null,
            placeholder: String::new(),
            negate: false,
        }
    }

    /// The predicate that matches no row. Renders as `1 != 0`.
    pub const fn none() -> Self {
        Self::Leaf {
            key: String::new(),
            operation: Operation::None,
            value: Value::Null,
            placeholder: String::new(),
            negate: true,
        }
    }

    /// Returns `true` if this is the "all rows" predicate.
    pub const fn is_all(&self) -> bool {
        matches!(
            self,
            Self::Leaf {
                operation: Operation::None,
                negate: false,
                ..
            }
        )
    }

    /// Returns `true` if this is the "no rows" predicate.
    pub const fn is_none(&self) -> bool {
        matches!(
            self,
            Self::Leaf {
                operation: Operation::None,
                negate: true,
                ..
            }
        )
    }

    /// Returns `true` if the rendered SQL is wrapped in `NOT (...)`.
    pub const fn is_negated(&self) -> bool {
        match self {
            Self::Leaf {
                operation, negate, ..
            } => *negate && !matches!(operation, Operation::None),
            Self::Combine { negate, .. } => *negate,
        }
    }

    /// Returns the logical negation of this expression.
    ///
    /// Comparisons swap to their complementary operator. `IsIn`, the LIKE
    /// operations and combined expressions are wrapped in `NOT (...)`
    /// instead. Negating twice gives back the original expression.
    #[must_use]
    pub fn negate(&self) -> Self {
        let mut negated = self.clone();
        match &mut negated {
            Self::Leaf {
                operation, negate, ..
            } => match operation.complement() {
                Some(complement) => *operation = complement,
                None => *negate = !*negate,
            },
            Self::Combine { negate, .. } => *negate = !*negate,
        }
        negated
    }

    /// Combines two expressions with AND.
    ///
    /// `all` is the identity and `none` absorbs.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        if self.is_all() || other.is_none() {
            other
        } else if other.is_all() || self.is_none() {
            self
        } else {
            Self::combine(Combinator::And, self, other)
        }
    }

    /// Combines two expressions with OR.
    ///
    /// `none` is the identity and `all` absorbs.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        if self.is_none() || other.is_all() {
            other
        } else if other.is_none() || self.is_all() {
            self
        } else {
            Self::combine(Combinator::Or, self, other)
        }
    }

    fn combine(combinator: Combinator, left: Self, right: Self) -> Self {
        Self::Combine {
            combinator,
            children: Box::new([left, right]),
            negate: false,
        }
    }

    /// Renders the expression with raw keys and named placeholders.
    pub fn sql(&self) -> String {
        // The named renderer never fails.
        self.render(&mut NamedRenderer).unwrap_or_default()
    }

    /// Renders the expression through `renderer`.
    ///
    /// Placeholders are requested in the same order in which
    /// [`bind_values`](Self::bind_values) pushes values.
    pub fn render(&self, renderer: &mut dyn SqlRenderer) -> DjangoResult<String> {
        match self {
            Self::Leaf {
                key,
                operation,
                value,
                placeholder,
                negate,
            } => {
                let sql = match operation {
                    Operation::None => {
                        return Ok(if *negate { "1 != 0".to_string() } else { String::new() })
                    }
                    Operation::IsIn => {
                        let items = list_items(value);
                        if items.is_empty() {
                            "1 != 0".to_string()
                        } else {
                            let column = renderer.column(key)?;
                            let marks: Vec<String> = (0..items.len())
                                .map(|i| renderer.placeholder(&format!("{placeholder}_{i}")))
                                .collect();
                            format!("{column} IN ({})", marks.join(", "))
                        }
                    }
                    Operation::Equals if value.is_null() => {
                        format!("{} IS NULL", renderer.column(key)?)
                    }
                    Operation::NotEquals if value.is_null() => {
                        format!("{} IS NOT NULL", renderer.column(key)?)
                    }
                    op => {
                        let column = renderer.column(key)?;
                        let mark = renderer.placeholder(placeholder);
                        format!("{column} {} {mark}", op.sql_operator())
                    }
                };
                Ok(if *negate { format!("NOT ({sql})") } else { sql })
            }
            Self::Combine {
                combinator,
                children,
                negate,
            } => {
                let mut parts = Vec::with_capacity(2);
                for child in children.iter() {
                    let rendered = child.render(renderer)?;
                    if matches!(child, Self::Combine { .. }) {
                        parts.push(format!("({rendered})"));
                    } else {
                        parts.push(rendered);
                    }
                }
                let joined = parts.join(combinator.separator());
                Ok(if *negate { format!("NOT ({joined})") } else { joined })
            }
        }
    }

    /// Appends the values to bind, in placeholder order.
    pub fn bind_values(&self, sink: &mut Vec<Value>) {
        match self {
            Self::Leaf {
                operation, value, ..
            } => match operation {
                Operation::None => {}
                Operation::IsIn => sink.extend(list_items(value).iter().cloned()),
                Operation::Equals | Operation::NotEquals if value.is_null() => {}
                op if op.is_like() => sink.push(like_pattern(*op, value)),
                _ => sink.push(value.clone()),
            },
            Self::Combine { children, .. } => {
                for child in children.iter() {
                    child.bind_values(sink);
                }
            }
        }
    }

    /// Returns the bound values as a new vector.
    pub fn values(&self) -> Vec<Value> {
        let mut values = Vec::new();
        self.bind_values(&mut values);
        values
    }

    /// Returns every field path referenced by the tree, in rendering order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::Leaf {
                key,
                operation: Operation::None,
                ..
            } if key.is_empty() => Vec::new(),
            Self::Leaf { key, .. } => vec![key.as_str()],
            Self::Combine { children, .. } => {
                children.iter().flat_map(Self::keys).collect()
            }
        }
    }
}

/// Treats a scalar `IsIn` operand as a one-element list.
fn list_items(value: &Value) -> &[Value] {
    match value {
        Value::List(items) => items,
        other => std::slice::from_ref(other),
    }
}

fn like_pattern(operation: Operation, value: &Value) -> Value {
    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(match operation {
        Operation::StartsWith => format!("{text}%"),
        Operation::EndsWith => format!("%{text}"),
        _ => format!("%{text}%"),
    })
}

impl ops::Not for WhereExpression {
    type Output = Self;

    fn not(self) -> Self::Output {
        self.negate()
    }
}

impl ops::BitAnd for WhereExpression {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.and(rhs)
    }
}

impl ops::BitOr for WhereExpression {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(key: &str, value: impl Into<Value>) -> WhereExpression {
        WhereExpression::new(key, Operation::Equals, value)
    }

    // ── Leaves ───────────────────────────────────────────────────────

    #[test]
    fn test_leaf_render() {
        let q = eq("username", "foouser");
        assert_eq!(q.sql(), "username = :username");
        assert_eq!(q.values(), vec![Value::from("foouser")]);
    }

    #[test]
    fn test_placeholder_replaces_separators() {
        assert_eq!(placeholder_for("user.username"), ":user_username");
        assert_eq!(placeholder_for("pk"), ":pk");
    }

    #[test]
    fn test_all_and_none_render() {
        assert!(WhereExpression::all().is_all());
        assert_eq!(WhereExpression::all().sql(), "");
        assert!(WhereExpression::none().is_none());
        assert_eq!(WhereExpression::none().sql(), "1 != 0");
        assert!(WhereExpression::default().is_all());
        assert!(WhereExpression::none().values().is_empty());
    }

    #[test]
    fn test_is_in_render() {
        let q = WhereExpression::new(
            "username",
            Operation::IsIn,
            Value::list(["foouser", "baruser"]),
        );
        assert_eq!(q.sql(), "username IN (:username_0, :username_1)");
        assert_eq!(
            q.values(),
            vec![Value::from("foouser"), Value::from("baruser")]
        );
    }

    #[test]
    fn test_is_in_empty_list_matches_nothing() {
        let q = WhereExpression::new("id", Operation::IsIn, Value::List(vec![]));
        assert_eq!(q.sql(), "1 != 0");
        assert!(q.values().is_empty());
    }

    #[test]
    fn test_like_operations() {
        let starts = WhereExpression::new("username", Operation::StartsWith, "foo");
        let ends = WhereExpression::new("username", Operation::EndsWith, "user");
        let contains = WhereExpression::new("username", Operation::Contains, "ou");
        assert_eq!(starts.sql(), "username LIKE :username");
        assert_eq!(starts.values(), vec![Value::from("foo%")]);
        assert_eq!(ends.values(), vec![Value::from("%user")]);
        assert_eq!(contains.values(), vec![Value::from("%ou%")]);
    }

    #[test]
    fn test_null_comparisons() {
        let is_null = eq("last_login", Value::Null);
        assert_eq!(is_null.sql(), "last_login IS NULL");
        assert!(is_null.values().is_empty());
        assert_eq!((!is_null).sql(), "last_login IS NOT NULL");
    }

    // ── Negation ─────────────────────────────────────────────────────

    #[test]
    fn test_negation_table() {
        let cases = [
            (Operation::Equals, "a != :a"),
            (Operation::NotEquals, "a = :a"),
            (Operation::GreaterThan, "a <= :a"),
            (Operation::LessOrEquals, "a > :a"),
            (Operation::LessThan, "a >= :a"),
            (Operation::GreaterOrEquals, "a < :a"),
        ];
        for (op, expected) in cases {
            let negated = !WhereExpression::new("a", op, 1);
            assert_eq!(negated.sql(), expected, "negating {op:?}");
            assert_eq!(negated.values(), vec![Value::Int(1)]);
            assert!(!negated.is_negated());
        }
    }

    #[test]
    fn test_negate_is_in_wraps() {
        let q = WhereExpression::new("id", Operation::IsIn, Value::list([1_i64, 2]));
        let negated = !q;
        assert!(negated.is_negated());
        assert_eq!(negated.sql(), "NOT (id IN (:id_0, :id_1))");
    }

    #[test]
    fn test_negate_like_wraps() {
        let q = !WhereExpression::new("username", Operation::Contains, "ba");
        assert_eq!(q.sql(), "NOT (username LIKE :username)");
        assert_eq!(q.values(), vec![Value::from("%ba%")]);
    }

    #[test]
    fn test_negate_all_and_none() {
        assert!((!WhereExpression::all()).is_none());
        assert!((!WhereExpression::none()).is_all());
    }

    #[test]
    fn test_double_negation_is_identity() {
        let samples = vec![
            eq("a", 1),
            WhereExpression::new("a", Operation::GreaterThan, 1),
            WhereExpression::new("a", Operation::IsIn, Value::list([1_i64, 2])),
            WhereExpression::new("a", Operation::StartsWith, "x"),
            eq("a", 1) & eq("b", 2),
            eq("a", 1) | (eq("b", 2) & eq("c", 3)),
            WhereExpression::all(),
            WhereExpression::none(),
        ];
        for p in samples {
            let back = !!p.clone();
            assert_eq!(back.sql(), p.sql());
            assert_eq!(back.values(), p.values());
            assert_eq!(back, p);
        }
    }

    #[test]
    fn test_negate_combine_does_not_distribute() {
        let q = !(eq("a", 1) & eq("b", 2));
        assert_eq!(q.sql(), "NOT (a = :a AND b = :b)");
    }

    // ── Combination ──────────────────────────────────────────────────

    #[test]
    fn test_and_or_render() {
        let q = eq("a", 1) & eq("b", 2);
        assert_eq!(q.sql(), "a = :a AND b = :b");
        let q = eq("a", 1) | eq("b", 2);
        assert_eq!(q.sql(), "a = :a OR b = :b");
    }

    #[test]
    fn test_absorption() {
        let p = eq("a", 1);
        assert_eq!(p.clone() & WhereExpression::all(), p);
        assert_eq!(WhereExpression::all() & p.clone(), p);
        assert!((p.clone() & WhereExpression::none()).is_none());
        assert!((WhereExpression::none() & p.clone()).is_none());
        assert!((p.clone() | WhereExpression::all()).is_all());
        assert!((WhereExpression::all() | p.clone()).is_all());
        assert_eq!(p.clone() | WhereExpression::none(), p);
        assert_eq!(WhereExpression::none() | p.clone(), p);
    }

    #[test]
    fn test_chain_stays_left_leaning() {
        let q = eq("a", 1) & eq("b", 2) & eq("c", 3);
        match &q {
            WhereExpression::Combine { children, .. } => {
                assert!(matches!(children[0], WhereExpression::Combine { .. }));
                assert!(matches!(children[1], WhereExpression::Leaf { .. }));
            }
            WhereExpression::Leaf { .. } => panic!("Expected Combine"),
        }
        assert_eq!(q.sql(), "(a = :a AND b = :b) AND c = :c");
        assert_eq!(q.values(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_mixed_nesting_parenthesized() {
        let q = eq("a", 1) | (eq("b", 2) & !eq("c", 3));
        assert_eq!(q.sql(), "a = :a OR (b = :b AND c != :c)");
        assert_eq!(q.values(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    }

    #[test]
    fn test_identical_placeholders_bind_positionally() {
        let q = eq("username", "foouser") | eq("username", "baruser");
        assert_eq!(q.sql(), "username = :username OR username = :username");
        assert_eq!(
            q.values(),
            vec![Value::from("foouser"), Value::from("baruser")]
        );
    }

    #[test]
    fn test_keys_in_render_order() {
        let q = eq("user__username", "x") & eq("text", "y");
        assert_eq!(q.keys(), vec!["user__username", "text"]);
        assert!(WhereExpression::all().keys().is_empty());
    }

    // ── Custom renderer ──────────────────────────────────────────────

    struct Positional {
        count: usize,
    }

    impl SqlRenderer for Positional {
        fn column(&mut self, key: &str) -> DjangoResult<String> {
            Ok(format!("t.{key}"))
        }

        fn placeholder(&mut self, _named: &str) -> String {
            self.count += 1;
            format!("${}", self.count)
        }
    }

    #[test]
    fn test_render_and_bind_agree() {
        let q = (eq("a", 1) | WhereExpression::new("b", Operation::IsIn, Value::list([2_i64, 3])))
            & !WhereExpression::new("c", Operation::EndsWith, "z");
        let mut renderer = Positional { count: 0 };
        let sql = q.render(&mut renderer).unwrap();
        assert_eq!(
            sql,
            "(t.a = $1 OR t.b IN ($2, $3)) AND NOT (t.c LIKE $4)"
        );
        assert_eq!(renderer.count, q.values().len());
    }
}
