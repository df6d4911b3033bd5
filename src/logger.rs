use std::fs::OpenOptions;
use std::io;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Installs the global subscriber described by `config`
///
/// Output goes through a non-blocking writer; keep the returned guard alive
/// until shutdown so buffered lines are flushed.
///
/// # Errors
///
/// Fails if `output` names a file that cannot be opened for appending.
pub fn setup_logging(config: &LoggingConfig) -> io::Result<WorkerGuard> {
    // Uses RUST_LOG environment variable if set, otherwise uses the configured level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    // ISO 8601 (RFC 3339) timestamps: 2024-01-12T15:30:45.123456789+03:00
    let timer = fmt::time::ChronoLocal::rfc_3339();

    let (writer, guard) = open_writer(&config.output)?;

    let layer = if config.format.eq_ignore_ascii_case("text") {
        fmt::layer()
            .with_timer(timer)
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    } else {
        fmt::layer()
            .with_timer(timer)
            .json()
            .with_writer(writer)
            .with_filter(filter)
            .boxed()
    };

    if tracing_subscriber::registry().with(layer).try_init().is_err() {
        eprintln!("global tracing subscriber already set, keeping it");
    }

    tracing::info!(
        level = %config.level,
        format = %config.format,
        output = %config.output,
        "Logging initialized"
    );

    Ok(guard)
}

/// Non-blocking writer for "stdout", "stderr" or an appended file path
fn open_writer(output: &str) -> io::Result<(NonBlocking, WorkerGuard)> {
    match output {
        "stdout" | "" => Ok(tracing_appender::non_blocking(io::stdout())),
        "stderr" => Ok(tracing_appender::non_blocking(io::stderr())),
        path => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Ok(tracing_appender::non_blocking(file))
        }
    }
}
