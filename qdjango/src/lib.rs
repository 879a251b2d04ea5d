//! # qdjango
//!
//! A Django-style query engine for Rust.
//!
//! This is the meta-crate that re-exports all sub-crates for convenient access.
//! You can depend on `qdjango` to get the engine together with the SQLite
//! driver, or depend on individual crates for finer-grained control.
//!
//! ## Quick Start
//!
//! ```no_run
//! use qdjango::prelude::*;
//!
//! # fn main() -> DjangoResult<()> {
//! let db = DatabaseConfig::sqlite_memory().connect()?;
//! set_default(db);
//!
//! // With a registered model `User`:
//! // let active = Manager::<User>::new()
//! //     .filter(WhereExpression::new("is_active", Operation::Equals, true))
//! //     .order_by(&["-date_joined"])
//! //     .limit(0, Some(10));
//! # Ok(())
//! # }
//! ```

/// Error types, settings, and logging setup.
pub use qdjango_core as core;

/// Models, predicates, SQL compilation, and querysets.
pub use qdjango_db as db;

/// Connection configuration and the SQLite driver.
pub use qdjango_db_backends as db_backends;

pub use chrono;
pub use tracing;

/// Commonly used items, for glob import.
pub mod prelude {
    pub use qdjango_core::{DjangoError, DjangoResult, Settings};
    pub use qdjango_db::query::where_clause::{Operation, WhereExpression};
    pub use qdjango_db::{
        clear_default, delete_model, save_model, set_default, Database, DbExecutor, Manager,
        Model, QuerySet, Value,
    };
    pub use qdjango_db_backends::DatabaseConfig;
}
