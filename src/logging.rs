//! Tracing initialisation: configured level, optional log-file redirect.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `level` comes from configuration and accepts anything an `EnvFilter`
/// directive does; an invalid value falls back to `info`. When `log_file` is
/// set, output goes there instead of stdout; a file that cannot be opened
/// falls back to stdout with a warning rather than aborting startup.
pub fn init(level: &str, log_file: Option<&Path>) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file.map(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|err| (path, err))
    }) {
        Some(Ok(file)) => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Arc::new(file))
                .with_ansi(false)
                .init();
        }
        Some(Err((path, err))) => {
            eprintln!(
                "warning: failed to open log file {}, using stdout: {err}",
                path.display()
            );
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
