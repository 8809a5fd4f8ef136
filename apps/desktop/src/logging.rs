use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "session.log";

/// Keeps the file writer flushing for as long as it lives.
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// `0` silences logging, `1` is info, `2` and above is debug plus a copy in
/// `logs/session.log`.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "off",
        1 => "info",
        _ => "debug",
    }
}

pub fn init_logger(verbosity: u8) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(level_for(verbosity)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let mut file_guard = None;
    let file_layer = if verbosity >= 2 {
        let appender = tracing_appender::rolling::never(LOG_DIR, LOG_FILE);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);
        Some(fmt::layer().with_writer(writer).with_ansi(false))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_guard.is_some() {
        tracing::info!(path = %format!("{LOG_DIR}/{LOG_FILE}"), "detailed logging enabled");
    }

    LoggingGuard { _file: file_guard }
}
