//! # qdjango-db-backends
//!
//! Database drivers for qdjango. Provides the SQLite driver
//! ([`SqliteBackend`], behind the default `sqlite` feature) and
//! [`DatabaseConfig`], which turns a settings entry into a connected
//! [`Database`](qdjango_db::Database).
//!
//! PostgreSQL and MySQL are available as SQL dialects for compilation but
//! have no driver here.

pub mod base;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{
    connect_default, DatabaseConfig, DEFAULT_DB_ALIAS, MYSQL_ENGINE, POSTGRESQL_ENGINE,
    SQLITE_ENGINE,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
