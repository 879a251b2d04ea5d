//! The [`Model`] trait, schema descriptors and typed accessor tables.
//!
//! Every entity type describes itself twice, once each:
//!
//! - [`ModelMeta`] is the schema descriptor the compiler consumes: table
//!   name and ordered local fields, including foreign keys.
//! - [`Accessors`] is the table of typed getter/setter pairs used to copy
//!   decoded row values into an entity, plus the slots that receive eagerly
//!   loaded related objects.
//!
//! Both are built once, typically in a `LazyLock`.
//!
//! # Examples
//!
//! ```
//! use std::sync::LazyLock;
//! use qdjango_db::fields::{FieldDef, FieldType};
//! use qdjango_db::model::{Accessors, Model, ModelMeta};
//!
//! #[derive(Debug, Default)]
//! struct Group {
//!     id: i64,
//!     name: String,
//! }
//!
//! impl Model for Group {
//!     fn meta() -> &'static ModelMeta {
//!         static META: LazyLock<ModelMeta> = LazyLock::new(|| {
//!             ModelMeta::new(
//!                 "Group",
//!                 "group",
//!                 vec![FieldDef::new("name", FieldType::CharField).max_length(80)],
//!             )
//!         });
//!         &META
//!     }
//!
//!     fn accessors() -> &'static Accessors<Self> {
//!         static ACCESSORS: LazyLock<Accessors<Group>> = LazyLock::new(|| {
//!             Accessors::<Group>::new()
//!                 .field("id", |g| &g.id, |g| &mut g.id)
//!                 .field("name", |g| &g.name, |g| &mut g.name)
//!         });
//!         &ACCESSORS
//!     }
//! }
//!
//! // An "id" primary key is added when none is declared.
//! assert_eq!(Group::meta().primary_key().name, "id");
//! ```

use qdjango_core::{DjangoError, DjangoResult};

use crate::fields::{FieldDef, FieldType};
use crate::registry::ModelRegistry;
use crate::value::{FromValue, Value};

/// The core trait implemented by every entity type.
pub trait Model: Default + Send + Sync + 'static {
    /// Returns the schema descriptor for this model type.
    fn meta() -> &'static ModelMeta;

    /// Returns the typed accessor table for this model type.
    fn accessors() -> &'static Accessors<Self>;

    /// Returns the registered model name (e.g. "User").
    fn model_name() -> &'static str {
        Self::meta().model_name
    }

    /// Returns the primary key value, or `Value::Null` when unreadable.
    fn pk(&self) -> Value {
        let pk = Self::meta().primary_key();
        Self::accessors()
            .field_accessor(pk.name)
            .map_or(Value::Null, |accessor| accessor.get(self))
    }

    /// Stores a primary key value (used after INSERT).
    fn set_pk(&mut self, value: &Value) -> DjangoResult<()> {
        let pk = Self::meta().primary_key();
        match Self::accessors().field_accessor(pk.name) {
            Some(accessor) => accessor.set(self, value),
            None => Err(DjangoError::ImproperlyConfigured(format!(
                "Model '{}' has no accessor for primary key '{}'",
                Self::model_name(),
                pk.name
            ))),
        }
    }

    /// Returns `(column, value)` pairs for every local field with an accessor.
    fn field_values(&self) -> Vec<(&'static FieldDef, Value)> {
        let accessors = Self::accessors();
        Self::meta()
            .fields()
            .iter()
            .filter_map(|field| {
                accessors
                    .field_accessor(field.name)
                    .map(|accessor| (field, accessor.get(self)))
            })
            .collect()
    }
}

/// Schema descriptor of a model.
///
/// The field list always contains exactly one primary key: when none is
/// declared, an auto-incrementing `id` field is prepended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMeta {
    /// The registered model name (e.g. "User").
    pub model_name: &'static str,
    /// The database table name.
    pub db_table: String,
    fields: Vec<FieldDef>,
    pk_index: usize,
}

impl ModelMeta {
    /// Creates a descriptor for `model_name` stored in `db_table`.
    ///
    /// # Panics
    ///
    /// Panics if more than one field is marked as primary key.
    pub fn new(
        model_name: &'static str,
        db_table: impl Into<String>,
        mut fields: Vec<FieldDef>,
    ) -> Self {
        let declared: Vec<usize> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i)
            .collect();
        assert!(
            declared.len() <= 1,
            "Model '{model_name}' declares more than one primary key"
        );

        let pk_index = if let Some(&index) = declared.first() {
            index
        } else {
            fields.insert(0, FieldDef::new("id", FieldType::AutoField).primary_key());
            0
        };

        Self {
            model_name,
            db_table: db_table.into(),
            fields,
            pk_index,
        }
    }

    /// Returns the ordered local fields, foreign keys included.
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Returns the primary key field.
    pub fn primary_key(&self) -> &FieldDef {
        &self.fields[self.pk_index]
    }

    /// Looks up a field by attribute name, column name, or `pk`.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    /// Returns the position of a field in [`fields`](Self::fields).
    pub fn field_index(&self, name: &str) -> Option<usize> {
        if name == "pk" {
            return Some(self.pk_index);
        }
        self.fields.iter().position(|f| f.answers_to(name))
    }

    /// Returns the foreign key named `name` (attribute name only).
    pub fn foreign_key(&self, name: &str) -> Option<&FieldDef> {
        self.fields
            .iter()
            .find(|f| f.is_relation() && f.name == name)
    }

    /// Iterates over the foreign keys in declaration order.
    pub fn foreign_keys(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.is_relation())
    }
}

// ── Accessor tables ─────────────────────────────────────────────────────

type Getter<M> = Box<dyn Fn(&M) -> Value + Send + Sync>;
type Setter<M> = Box<dyn Fn(&mut M, &Value) -> DjangoResult<()> + Send + Sync>;
type RelatedLoader<M> =
    Box<dyn Fn(&mut M, &[Value], usize, &ModelRegistry) -> DjangoResult<usize> + Send + Sync>;

/// A typed getter/setter pair for one local field.
pub struct FieldAccessor<M> {
    /// The field's attribute name in [`ModelMeta`].
    pub name: &'static str,
    get: Getter<M>,
    set: Setter<M>,
}

impl<M> FieldAccessor<M> {
    /// Reads the field as a [`Value`].
    pub fn get(&self, entity: &M) -> Value {
        (self.get)(entity)
    }

    /// Converts `value` and stores it in the field.
    pub fn set(&self, entity: &mut M, value: &Value) -> DjangoResult<()> {
        (self.set)(entity, value)
    }
}

/// The slot receiving an eagerly loaded object behind a foreign key.
pub struct RelatedAccessor<M> {
    /// The foreign key's attribute name in [`ModelMeta`].
    pub name: &'static str,
    load: RelatedLoader<M>,
    register: fn(&ModelRegistry),
}

/// The per-type accessor table of a [`Model`].
pub struct Accessors<M> {
    fields: Vec<FieldAccessor<M>>,
    related: Vec<RelatedAccessor<M>>,
}

impl<M: Model> Default for Accessors<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Model> Accessors<M> {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            fields: Vec::new(),
            related: Vec::new(),
        }
    }

    /// Adds the accessor for local field `name`, stored in a struct member
    /// of type `T`.
    ///
    /// For a foreign key, `name` is the key's attribute name and the member
    /// holds the raw key value.
    #[must_use]
    pub fn field<T>(
        mut self,
        name: &'static str,
        get: fn(&M) -> &T,
        get_mut: fn(&mut M) -> &mut T,
    ) -> Self
    where
        T: Clone + Into<Value> + FromValue + 'static,
    {
        self.fields.push(FieldAccessor {
            name,
            get: Box::new(move |entity: &M| -> Value { get(entity).clone().into() }),
            set: Box::new(move |entity: &mut M, value: &Value| -> DjangoResult<()> {
                *get_mut(entity) = T::from_value(value).map_err(|e| {
                    DjangoError::SerializationError(format!("Field '{name}': {e}"))
                })?;
                Ok(())
            }),
        });
        self
    }

    /// Adds the slot that receives the related `R` loaded through foreign
    /// key `name` when a queryset uses `select_related`.
    #[must_use]
    pub fn related<R: Model>(
        mut self,
        name: &'static str,
        slot: fn(&mut M) -> &mut Option<Box<R>>,
    ) -> Self {
        self.related.push(RelatedAccessor {
            name,
            load: Box::new(
                move |entity: &mut M,
                      values: &[Value],
                      depth: usize,
                      registry: &ModelRegistry|
                      -> DjangoResult<usize> {
                    let mut related = R::default();
                    let used = load_entity(&mut related, values, depth, registry)?;
                    *slot(entity) = Some(Box::new(related));
                    Ok(used)
                },
            ),
            register: |registry| registry.register::<R>(),
        });
        self
    }

    /// Returns the accessor for local field `name`.
    pub fn field_accessor(&self, name: &str) -> Option<&FieldAccessor<M>> {
        self.fields.iter().find(|a| a.name == name)
    }

    /// Returns the related-object slot for foreign key `name`.
    pub fn related_accessor(&self, name: &str) -> Option<&RelatedAccessor<M>> {
        self.related.iter().find(|a| a.name == name)
    }

    /// Registers every model reachable through a related-object slot.
    pub(crate) fn register_related(&self, registry: &ModelRegistry) {
        for related in &self.related {
            (related.register)(registry);
        }
    }
}

/// Copies one decoded row into `entity`.
///
/// `values` starts at the entity's first column. Local fields are copied by
/// name in [`ModelMeta`] order; when `related_depth` is non-zero, the columns
/// of each foreign key's model follow, depth-first, in foreign key order.
/// Returns the number of columns consumed.
pub fn load_entity<M: Model>(
    entity: &mut M,
    values: &[Value],
    related_depth: usize,
    registry: &ModelRegistry,
) -> DjangoResult<usize> {
    let meta = M::meta();
    let accessors = M::accessors();
    let local = meta.fields().len();
    if values.len() < local {
        return Err(DjangoError::DatabaseError(format!(
            "Row has {} columns, model '{}' needs {local}",
            values.len(),
            meta.model_name
        )));
    }

    for (field, value) in meta.fields().iter().zip(values) {
        if let Some(accessor) = accessors.field_accessor(field.name) {
            accessor.set(entity, value)?;
        }
    }

    let mut consumed = local;
    if related_depth > 0 {
        for fk in meta.foreign_keys() {
            let rest = &values[consumed..];
            consumed += match accessors.related_accessor(fk.name) {
                Some(related) => (related.load)(entity, rest, related_depth - 1, registry)?,
                None => {
                    let target = fk.related_model().unwrap_or_default();
                    registry.column_width(target, related_depth - 1)?
                }
            };
        }
    }
    Ok(consumed)
}
