//! Logging initialization.
//!
//! Console output plus a daily-rolling log file, with local timezone
//! timestamps so log lines line up with the console tables.

use std::path::Path;

use chrono::Local;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "streamcap=info,sqlx=warn";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%H:%M:%S"))
    }
}

/// Initialize tracing with console and rolling-file layers.
///
/// The returned guard must be held for the lifetime of the process; dropping
/// it stops the background log writer.
pub fn init(log_dir: &Path) -> std::io::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "streamcap.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_timer(LocalTimer)
                .with_target(false),
        )
        .with(
            fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}
