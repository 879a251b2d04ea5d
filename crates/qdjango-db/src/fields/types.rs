//! Field type definitions for the schema registry.
//!
//! Each [`FieldDef`] describes one local column of a model: its name, the
//! column it maps to, its type, and whether it is the primary key or a
//! foreign key into another registered model.

/// The type of a model field, determining how its values are stored.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    /// Auto-incrementing 32-bit integer primary key.
    AutoField,
    /// Auto-incrementing 64-bit integer primary key.
    BigAutoField,
    /// Variable-length string with a max length.
    CharField,
    /// Unlimited-length text.
    TextField,
    /// 32-bit signed integer.
    IntegerField,
    /// 64-bit signed integer.
    BigIntegerField,
    /// 64-bit floating-point number.
    FloatField,
    /// Boolean (true/false).
    BooleanField,
    /// Date without time.
    DateField,
    /// Date and time.
    DateTimeField,
    /// Time without date.
    TimeField,
    /// Raw binary data.
    BinaryField,
    /// Many-to-one relationship to the primary key of another model.
    ForeignKey {
        /// The target model name as registered (e.g. "User").
        to: String,
    },
}

impl FieldType {
    /// Returns `true` for primary keys assigned by the database.
    pub const fn is_auto(&self) -> bool {
        matches!(self, Self::AutoField | Self::BigAutoField)
    }
}

/// Complete definition of a model field.
///
/// Constructed manually when implementing the [`Model`](crate::model::Model)
/// trait:
///
/// ```
/// use qdjango_db::fields::{FieldDef, FieldType};
///
/// let username = FieldDef::new("username", FieldType::CharField).max_length(30);
/// assert_eq!(username.column, "username");
///
/// let user = FieldDef::foreign_key("user", "User");
/// assert_eq!(user.column, "user_id");
/// assert!(user.db_index);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    /// The Rust attribute name of this field.
    pub name: &'static str,
    /// The database column name (may differ from `name`).
    pub column: String,
    /// The type of this field.
    pub field_type: FieldType,
    /// Whether this field is the primary key.
    pub primary_key: bool,
    /// Whether NULL is allowed in the database.
    pub null: bool,
    /// Whether a database index should be created.
    pub db_index: bool,
    /// Maximum character length (for CharField).
    pub max_length: Option<usize>,
}

impl FieldDef {
    /// Creates a new `FieldDef` with sensible defaults.
    pub fn new(name: &'static str, field_type: FieldType) -> Self {
        Self {
            name,
            column: name.to_string(),
            field_type,
            primary_key: false,
            null: false,
            db_index: false,
            max_length: None,
        }
    }

    /// Creates a foreign key named `name` pointing at model `to`.
    ///
    /// The column is `<name>_id` and is indexed.
    pub fn foreign_key(name: &'static str, to: impl Into<String>) -> Self {
        Self {
            column: format!("{name}_id"),
            db_index: true,
            ..Self::new(name, FieldType::ForeignKey { to: to.into() })
        }
    }

    /// Sets the database column name.
    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Marks this field as the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Allows NULL values in the database.
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.null = true;
        self
    }

    /// Sets the maximum character length.
    #[must_use]
    pub const fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// Marks this field as having a database index.
    #[must_use]
    pub const fn db_index(mut self) -> Self {
        self.db_index = true;
        self
    }

    /// Returns the target model name if this field is a foreign key.
    pub fn related_model(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::ForeignKey { to } => Some(to),
            _ => None,
        }
    }

    /// Returns `true` if this field is a foreign key.
    pub const fn is_relation(&self) -> bool {
        matches!(self.field_type, FieldType::ForeignKey { .. })
    }

    /// Returns `true` if `name` designates this field, either by attribute
    /// name or by column name (`user` and `user_id` both match a `user` key).
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.column == name
    }
}
