//! The schema registry: model name to schema descriptor.
//!
//! The compiler follows foreign keys by target model name, so every model
//! reachable from a query must be registered. [`ModelRegistry::register`]
//! also registers every model reachable through the type's related-object
//! slots, and querysets register their own model on creation.

use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

use qdjango_core::{DjangoError, DjangoResult};

use crate::model::{Model, ModelMeta};

/// A thread-safe map from model name to schema descriptor.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<&'static str, &'static ModelMeta>>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `M` and every model reachable through its related slots.
    pub fn register<M: Model>(&self) {
        if self.register_meta(M::meta()) {
            M::accessors().register_related(self);
        }
    }

    /// Registers a schema descriptor. Returns `false` if a model with the
    /// same name was already present; the first registration wins.
    pub fn register_meta(&self, meta: &'static ModelMeta) -> bool {
        let mut models = self.models.write().unwrap_or_else(PoisonError::into_inner);
        if models.contains_key(meta.model_name) {
            return false;
        }
        models.insert(meta.model_name, meta);
        tracing::debug!(model = meta.model_name, table = %meta.db_table, "registered model");
        true
    }

    /// Returns the descriptor registered under `name`.
    pub fn get(&self, name: &str) -> Option<&'static ModelMeta> {
        self.models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied()
    }

    /// Returns the descriptor registered under `name`, or an error naming it.
    pub fn resolve(&self, name: &str) -> DjangoResult<&'static ModelMeta> {
        self.get(name).ok_or_else(|| {
            DjangoError::ImproperlyConfigured(format!("Model '{name}' is not registered"))
        })
    }

    /// Returns `true` if a model named `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns the registered model names, sorted.
    pub fn model_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self
            .models
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        names.sort_unstable();
        names
    }

    /// Returns how many columns a row of `model` occupies when its related
    /// models are followed `related_depth` levels deep.
    pub fn column_width(&self, model: &str, related_depth: usize) -> DjangoResult<usize> {
        let meta = self.resolve(model)?;
        let mut width = meta.fields().len();
        if related_depth > 0 {
            for fk in meta.foreign_keys() {
                let target = fk.related_model().unwrap_or_default();
                width += self.column_width(target, related_depth - 1)?;
            }
        }
        Ok(width)
    }
}

static REGISTRY: LazyLock<ModelRegistry> = LazyLock::new(ModelRegistry::new);

/// Returns the process-wide registry used by querysets.
pub fn registry() -> &'static ModelRegistry {
    &REGISTRY
}

/// Registers `M` (and its related models) in the process-wide registry.
pub fn register_model<M: Model>() {
    registry().register::<M>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldDef, FieldType};
    use crate::model::Accessors;

    #[derive(Debug, Default)]
    struct Tag {
        id: i64,
    }

    impl Model for Tag {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> =
                LazyLock::new(|| ModelMeta::new("Tag", "tag", vec![]));
            &META
        }

        fn accessors() -> &'static Accessors<Self> {
            static ACCESSORS: LazyLock<Accessors<Tag>> =
                LazyLock::new(|| Accessors::<Tag>::new().field("id", |t| &t.id, |t| &mut t.id));
            &ACCESSORS
        }
    }

    #[derive(Debug, Default)]
    struct Post {
        id: i64,
        tag_id: i64,
        tag: Option<Box<Tag>>,
    }

    impl Model for Post {
        fn meta() -> &'static ModelMeta {
            static META: LazyLock<ModelMeta> = LazyLock::new(|| {
                ModelMeta::new(
                    "Post",
                    "post",
                    vec![
                        FieldDef::new("title", FieldType::CharField),
                        FieldDef::foreign_key("tag", "Tag"),
                    ],
                )
            });
            &META
        }

        fn accessors() -> &'static Accessors<Self> {
            static ACCESSORS: LazyLock<Accessors<Post>> = LazyLock::new(|| {
                Accessors::<Post>::new()
                    .field("id", |p| &p.id, |p| &mut p.id)
                    .field("tag", |p| &p.tag_id, |p| &mut p.tag_id)
                    .related("tag", |p| &mut p.tag)
            });
            &ACCESSORS
        }
    }

    #[test]
    fn test_register_follows_related_slots() {
        let registry = ModelRegistry::new();
        registry.register::<Post>();
        assert_eq!(registry.model_names(), vec!["Post", "Tag"]);
        assert!(registry.contains("Tag"));
        assert_eq!(registry.get("Post").unwrap().db_table, "post");
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = ModelRegistry::new();
        assert!(registry.register_meta(Tag::meta()));
        assert!(!registry.register_meta(Tag::meta()));
        registry.register::<Tag>();
        assert_eq!(registry.model_names(), vec!["Tag"]);
    }

    #[test]
    fn test_resolve_unknown_model() {
        let registry = ModelRegistry::new();
        let err = registry.resolve("Ghost").unwrap_err();
        assert!(matches!(err, DjangoError::ImproperlyConfigured(_)));
        assert!(err.to_string().contains("Ghost"));
    }

    #[test]
    fn test_column_width() {
        let registry = ModelRegistry::new();
        registry.register::<Post>();
        assert_eq!(registry.column_width("Post", 0).unwrap(), 3);
        assert_eq!(registry.column_width("Post", 1).unwrap(), 4);
        assert_eq!(registry.column_width("Tag", 5).unwrap(), 1);
    }

    #[test]
    fn test_global_registry() {
        register_model::<Post>();
        assert!(registry().contains("Post"));
        assert!(registry().contains("Tag"));
    }
}
