//! Structured logging configuration.
//!
//! Installs a `tracing` subscriber that also receives the `log` records
//! emitted by the `poker_score` library.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var and default to
/// `info,sqlx=warn,hyper=warn`.
///
/// # Example
///
/// ```no_run
/// ps_server::logging::init();
/// tracing::info!("Server starting");
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a client command against a room ledger
///
/// # Arguments
///
/// * `command` - Command name, e.g. `bet` or `confirm_settlement`
/// * `room_id` - Room the command targeted
/// * `user_id` - Caller
/// * `error_code` - Stable error code when the command was rejected
pub fn log_ledger_event(command: &str, room_id: i64, user_id: i64, error_code: Option<&str>) {
    match error_code {
        Some(code) => tracing::warn!(
            command = command,
            room_id = room_id,
            user_id = user_id,
            error_code = code,
            "Ledger command rejected"
        ),
        None => tracing::info!(
            command = command,
            room_id = room_id,
            user_id = user_id,
            "Ledger command applied"
        ),
    }
}

/// Log performance metric
///
/// Operations slower than one second are reported at `warn`.
///
/// ```
/// use ps_server::logging::log_performance;
/// use std::time::Instant;
///
/// let start = Instant::now();
/// let duration = start.elapsed().as_millis() as u64;
/// log_performance("inactivity_sweep", duration, Some("3 rooms"));
/// ```
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > 1000 {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "Performance metric"
        );
    }
}
