//! Settings loading from configuration files.
//!
//! This module loads [`Settings`] from TOML or JSON files and applies
//! environment variable overrides.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (deep-merged over the defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `QDJANGO_DEBUG` | `debug` |
//! | `QDJANGO_LOG_LEVEL` | `log_level` |
//! | `QDJANGO_LOG_SQL` | `log_sql` |
//! | `QDJANGO_DATABASE_ENGINE` | `databases.default.engine` |
//! | `QDJANGO_DATABASE_NAME` | `databases.default.name` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use qdjango_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/qdjango.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::DjangoError;
use crate::settings::{DatabaseSettings, Settings};

/// Loads settings from a TOML string.
///
/// Any setting not present in the TOML keeps its default value.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, DjangoError> {
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| DjangoError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
///
/// # Errors
///
/// Returns an error if the JSON is malformed or cannot be deserialized.
pub fn from_json_str(json_str: &str) -> Result<Settings, DjangoError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| DjangoError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the JSON is malformed.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, DjangoError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `QDJANGO_*` environment variable overrides to a settings struct.
///
/// Database overrides target the `default` alias, creating it when missing.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("QDJANGO_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("QDJANGO_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("QDJANGO_LOG_SQL") {
        settings.log_sql = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("QDJANGO_DATABASE_ENGINE") {
        default_database(settings).engine = val;
    }

    if let Ok(val) = std::env::var("QDJANGO_DATABASE_NAME") {
        default_database(settings).name = val;
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn default_database(settings: &mut Settings) -> &mut DatabaseSettings {
    settings
        .databases
        .entry("default".to_string())
        .or_default()
}

fn read_config(path: &Path, format: &str) -> Result<String, DjangoError> {
    std::fs::read_to_string(path).map_err(|e| {
        DjangoError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

/// Deep-merges a parsed document over the default settings and deserializes it.
fn merge_over_defaults(value: serde_json::Value, format: &str) -> Result<Settings, DjangoError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        DjangoError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        DjangoError::ConfigurationError(format!("Failed to deserialize settings from {format}: {e}"))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => serde_json::Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
///
/// New database aliases start from [`DatabaseSettings::default`] so a file
/// may declare only the fields it changes.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = match base_map.remove(&key) {
                    Some(serde_json::Value::Object(databases)) if key == "databases" => {
                        merge_databases(databases, override_v)
                    }
                    Some(base_v) => merge_json(base_v, override_v),
                    None => override_v,
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}

fn merge_databases(
    mut base: serde_json::Map<String, serde_json::Value>,
    override_val: serde_json::Value,
) -> serde_json::Value {
    let serde_json::Value::Object(aliases) = override_val else {
        return override_val;
    };
    for (alias, entry) in aliases {
        let start = base.remove(&alias).unwrap_or_else(|| {
            serde_json::to_value(DatabaseSettings::default()).unwrap_or_default()
        });
        base.insert(alias, merge_json(start, entry));
    }
    serde_json::Value::Object(base)
}
