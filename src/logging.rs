//! Structured logging setup and shared clock helpers.

use std::time::{SystemTime, UNIX_EPOCH};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Current wall-clock time in milliseconds since epoch.
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as u64
}

/// Current wall-clock time in nanoseconds since epoch. Order and trade
/// records carry this resolution; outbound JSON truncates to milliseconds.
pub fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos() as u64
}

/// Async file logging with daily rotation plus a human-readable stdout
/// layer. The returned guard must stay alive for the life of the process.
pub fn setup_dual_logging(service_name: &str, log_dir: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(log_dir, format!("{}.log", service_name));
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .json()
                .with_target(true)
                .with_thread_ids(true),
        )
        .with(fmt::layer().with_writer(std::io::stdout).with_target(false))
        .init();

    guard
}
