//! # qdjango-core
//!
//! Core types, settings, and error types for qdjango. This crate has no
//! dependency on the query engine and provides the foundation for the other
//! crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Engine settings and global configuration
//! - [`settings_loader`] - TOML/JSON loading with environment overrides
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{DjangoError, DjangoResult};
pub use settings::{DatabaseSettings, Settings, SETTINGS};
