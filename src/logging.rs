use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "urbanlens.log";

/// Initializes console (stderr) and daily-rolling JSON file logging.
///
/// The returned guard flushes the file writer when dropped; keep it alive for
/// the lifetime of the process.
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let default_directive = if verbose { "urbanlens=debug" } else { "urbanlens=info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // File logging is best-effort: a read-only working directory still gets console output.
    let (file_layer, guard) = match fs::create_dir_all(LOG_DIR) {
        Ok(()) => {
            let file_appender = tracing_appender::rolling::daily(LOG_DIR, LOG_FILE);
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer().json().with_writer(non_blocking_writer);
            (Some(layer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_installs_subscriber() {
        let guard = init_logging(true);
        assert_eq!(guard.is_some(), std::path::Path::new(LOG_DIR).is_dir());
        tracing::debug!("logging initialized for tests");
    }
}
