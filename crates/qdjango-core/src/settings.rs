//! Settings system for qdjango.
//!
//! This module provides the [`Settings`] struct, which holds the engine
//! configuration, and [`LazySettings`], a globally-accessible,
//! lazily-initialized settings instance.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Engine identifier for the bundled SQLite backend.
pub const SQLITE_ENGINE: &str = "qdjango.db.backends.sqlite3";

/// Database connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (e.g. `qdjango.db.backends.sqlite3`).
    pub engine: String,
    /// The database name: a file path, or `:memory:` for SQLite.
    pub name: String,
    /// Additional engine-specific options (e.g. `busy_timeout_ms`).
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: SQLITE_ENGINE.to_string(),
            name: "db.sqlite3".to_string(),
            options: HashMap::new(),
        }
    }
}

/// The complete set of engine settings.
///
/// # Examples
///
/// ```
/// use qdjango_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.log_level, "info");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,

    // ── Database ─────────────────────────────────────────────────────

    /// Database configurations, keyed by alias (e.g. "default").
    pub databases: HashMap<String, DatabaseSettings>,

    // ── Logging ──────────────────────────────────────────────────────

    /// The log filter directive (e.g. "info", "qdjango::sql=debug").
    pub log_level: String,
    /// Whether every executed statement is logged with its parameters.
    pub log_sql: bool,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut databases = HashMap::new();
        databases.insert("default".to_string(), DatabaseSettings::default());

        Self {
            debug: true,
            databases,
            log_level: "info".to_string(),
            log_sql: false,
            extra: HashMap::new(),
        }
    }
}

impl Settings {
    /// Returns the database settings registered under `alias`.
    pub fn database(&self, alias: &str) -> Option<&DatabaseSettings> {
        self.databases.get(alias)
    }

    /// Returns the log filter directive, widened to include SQL tracing
    /// when `log_sql` is enabled.
    pub fn log_filter(&self) -> String {
        if self.log_sql {
            format!("{},qdjango::sql=debug", self.log_level)
        } else {
            self.log_level.clone()
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup to set the
/// settings, then use [`get`](LazySettings::get) to access them.
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the global settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        assert!(
            self.inner.set(settings).is_ok(),
            "Settings have already been configured"
        );
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        match self.inner.get() {
            Some(settings) => settings,
            None => panic!("Settings have not been configured. Call SETTINGS.configure() first."),
        }
    }

    /// Returns the configured settings, if any.
    pub fn try_get(&self) -> Option<&Settings> {
        self.inner.get()
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
