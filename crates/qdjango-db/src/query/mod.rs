//! Query building, compilation, and execution.
//!
//! This module contains the complete query pipeline:
//!
//! - [`where_clause`] - Predicate trees for filtering
//! - [`compiler`] - Query description and SQL compilation
//! - [`queryset`] - QuerySet and Manager for lazy query building

pub mod compiler;
pub mod queryset;
pub mod where_clause;

pub use compiler::{
    CompiledSelect, DatabaseBackendType, OrderBy, Query, SelectedColumn, SqlCompiler,
    MAX_RELATED_DEPTH,
};
pub use queryset::{Manager, QuerySet};
pub use where_clause::{Combinator, Operation, WhereExpression};
