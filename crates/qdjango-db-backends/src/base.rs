//! Connection configuration.
//!
//! [`DatabaseConfig`] holds the parameters needed to open a database and
//! turns a settings entry into a ready [`Database`] handle.

use std::collections::HashMap;

use qdjango_core::settings::{DatabaseSettings, Settings, SETTINGS};
use qdjango_core::{DjangoError, DjangoResult};
use qdjango_db::query::compiler::DatabaseBackendType;
use qdjango_db::{set_default, Database};

/// Alias of the database [`connect_default`] opens.
pub const DEFAULT_DB_ALIAS: &str = "default";

/// Engine name of the PostgreSQL dialect.
pub const POSTGRESQL_ENGINE: &str = "qdjango.db.backends.postgresql";
/// Engine name of the MySQL dialect.
pub const MYSQL_ENGINE: &str = "qdjango.db.backends.mysql";
pub use qdjango_core::settings::SQLITE_ENGINE;

/// Configuration for connecting to a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// The backend type.
    pub backend: DatabaseBackendType,
    /// The database name or file path.
    pub name: String,
    /// Additional connection options.
    pub options: HashMap<String, String>,
}

impl DatabaseConfig {
    /// Creates a configuration for a private in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::sqlite_file(":memory:")
    }

    /// Creates a configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self {
            backend: DatabaseBackendType::SQLite,
            name: path.into(),
            options: HashMap::new(),
        }
    }

    /// Adds a connection option.
    #[must_use]
    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Builds a configuration from a settings entry.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::ImproperlyConfigured`] for an unknown engine.
    pub fn from_settings(settings: &DatabaseSettings) -> DjangoResult<Self> {
        let backend = match settings.engine.as_str() {
            SQLITE_ENGINE => DatabaseBackendType::SQLite,
            POSTGRESQL_ENGINE => DatabaseBackendType::PostgreSQL,
            MYSQL_ENGINE => DatabaseBackendType::MySQL,
            other => {
                return Err(DjangoError::ImproperlyConfigured(format!(
                    "Unknown database engine '{other}'"
                )))
            }
        };
        Ok(Self {
            backend,
            name: settings.name.clone(),
            options: settings.options.clone(),
        })
    }

    /// Builds the configuration of database `alias` in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`DjangoError::ImproperlyConfigured`] if the alias is missing
    /// or names an unknown engine.
    pub fn from_alias(settings: &Settings, alias: &str) -> DjangoResult<Self> {
        let entry = settings.database(alias).ok_or_else(|| {
            DjangoError::ImproperlyConfigured(format!("Database '{alias}' is not configured"))
        })?;
        Self::from_settings(entry)
    }

    /// Opens the database and wraps it in a [`Database`] owned by the
    /// calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be opened, or
    /// [`DjangoError::NotSupported`] for a dialect without a driver.
    pub fn connect(&self) -> DjangoResult<Database> {
        match self.backend {
            #[cfg(feature = "sqlite")]
            DatabaseBackendType::SQLite => {
                let backend = crate::sqlite::SqliteBackend::open_with_options(
                    &self.name,
                    &self.options,
                )?;
                tracing::info!(vendor = "sqlite", name = %self.name, "connected to database");
                Ok(Database::new(backend))
            }
            other => Err(DjangoError::NotSupported(format!(
                "No driver available for {} databases",
                other.vendor()
            ))),
        }
    }
}

/// Opens the `default` database of the global [`SETTINGS`] and installs it
/// as the database for querysets without an explicit `using`.
///
/// # Errors
///
/// Returns [`DjangoError::ImproperlyConfigured`] if the global settings are
/// not configured or lack a usable `default` entry, or the connection error.
pub fn connect_default() -> DjangoResult<Database> {
    let settings = SETTINGS.try_get().ok_or_else(|| {
        DjangoError::ImproperlyConfigured(
            "Settings have not been configured; call SETTINGS.configure() first".to_string(),
        )
    })?;
    let db = DatabaseConfig::from_alias(settings, DEFAULT_DB_ALIAS)?.connect()?;
    set_default(db.clone());
    Ok(db)
}
