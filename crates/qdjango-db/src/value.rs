//! ORM value types for representing database values in a backend-agnostic way.
//!
//! The [`Value`] enum is used throughout the query engine for predicate
//! operands, bound parameters and decoded result columns. [`FromValue`]
//! converts decoded columns back into typed entity fields.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use qdjango_core::{DjangoError, DjangoResult};

/// A backend-agnostic representation of a database value.
///
/// # Examples
///
/// ```
/// use qdjango_db::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
    /// A date without time.
    Date(NaiveDate),
    /// A date and time without timezone.
    DateTime(NaiveDateTime),
    /// A time without date.
    Time(NaiveTime),
    /// A list of values, expanded to one placeholder each by `IsIn`.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Self::Time(t) => write!(f, "{t}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Text layout used when date-times are stored as strings.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

impl Value {
    /// Builds a [`Value::List`] from any iterator of convertible items.
    ///
    /// ```
    /// use qdjango_db::value::Value;
    ///
    /// let list = Value::list(["foouser", "baruser"]);
    /// assert_eq!(list.to_string(), "[foouser, baruser]");
    /// ```
    pub fn list<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a float value.
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

// ── FromValue ──────────────────────────────────────────────────────────

/// Trait for converting a decoded [`Value`] to a concrete Rust type.
///
/// Conversions accept the representations a backend may hand back for the
/// type: SQLite stores booleans as integers and date-times as text.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> DjangoResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> DjangoError {
    DjangoError::SerializationError(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            Value::Bool(b) => Ok(Self::from(*b)),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        let wide = i64::from_value(value)?;
        Self::try_from(wide).map_err(|e| {
            DjangoError::SerializationError(format!("Int value out of i32 range: {e}"))
        })
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as Self),
            _ => Err(mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Int(i) => Ok(*i != 0),
            _ => Err(mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::String(s) => Ok(s.as_bytes().to_vec()),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::DateTime(dt) => Ok(*dt),
            Value::String(s) => Self::parse_from_str(s, DATETIME_FORMAT)
                .or_else(|_| Self::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                .map_err(|e| {
                    DjangoError::SerializationError(format!("Invalid datetime '{s}': {e}"))
                }),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            Value::String(s) => Self::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| DjangoError::SerializationError(format!("Invalid date '{s}': {e}"))),
            _ => Err(mismatch("Date", value)),
        }
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Time(t) => Ok(*t),
            Value::String(s) => Self::parse_from_str(s, "%H:%M:%S%.f")
                .map_err(|e| DjangoError::SerializationError(format!("Invalid time '{s}': {e}"))),
            _ => Err(mismatch("Time", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> DjangoResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}
