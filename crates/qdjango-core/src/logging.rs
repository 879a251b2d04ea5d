//! Logging integration for qdjango.
//!
//! Provides helpers for configuring [`tracing`]-based logging from
//! [`Settings`](crate::settings::Settings) and for creating per-query spans.
//! Executed statements are emitted under the [`SQL_TARGET`] target.

use crate::settings::Settings;

/// The tracing target used for executed SQL statements.
pub const SQL_TARGET: &str = "qdjango::sql";

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter comes from [`Settings::log_filter`]. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing a second subscriber is silently ignored.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_new(settings.log_filter()).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for evaluating a queryset of `model`.
///
/// # Examples
///
/// ```
/// use qdjango_core::logging::query_span;
///
/// let span = query_span("User");
/// let _guard = span.enter();
/// tracing::debug!("fetching rows");
/// ```
pub fn query_span(model: &str) -> tracing::Span {
    tracing::debug_span!("queryset", model = model)
}
