use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_DIRECTIVE: &str = "intake_etl=info";

/// Initializes the logging system with both console and file output.
///
/// Console output is human readable; the file under `log_dir` is JSON,
/// rotated daily. Keep the returned guard alive until exit so buffered
/// lines are flushed.
pub fn init_logging(log_dir: &Path) -> WorkerGuard {
    let _ = fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "intake_etl.log");
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().json().with_writer(non_blocking_writer);
    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stdout);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    guard
}
