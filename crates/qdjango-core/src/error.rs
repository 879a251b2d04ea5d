//! Core error types for qdjango.
//!
//! This module provides the error enum [`DjangoError`] shared by the query
//! engine, the backends and the configuration layer. Its variants follow the
//! exception names Django uses for the same conditions.

use thiserror::Error;

/// The primary error type for qdjango.
///
/// Precondition violations in the query API (filtering an already paginated
/// queryset, projecting an unknown field) are programmer errors and panic
/// instead of producing one of these.
#[derive(Error, Debug)]
pub enum DjangoError {
    // ── ORM errors ───────────────────────────────────────────────────

    /// A field path could not be resolved against the model registry.
    #[error("Field error: {0}")]
    FieldError(String),

    /// The requested operation is not supported for this queryset.
    #[error("Not supported: {0}")]
    NotSupported(String),

    // ── Database ─────────────────────────────────────────────────────

    /// A generic database error reported by the driver.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The engine is used before it was set up (no database, no model).
    #[error("Improperly configured: {0}")]
    ImproperlyConfigured(String),

    // ── Serialization ────────────────────────────────────────────────

    /// A stored value could not be converted to the requested type.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DjangoError {
    /// Returns `true` for errors raised by the database driver itself.
    pub const fn is_database_error(&self) -> bool {
        matches!(
            self,
            Self::DatabaseError(_) | Self::IntegrityError(_) | Self::OperationalError(_)
        )
    }
}

/// A convenience type alias for `Result<T, DjangoError>`.
pub type DjangoResult<T> = Result<T, DjangoError>;
