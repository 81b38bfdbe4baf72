//! Tracing subscriber setup.

use crate::constants::logging::{DEFAULT_FILTER, LOG_FILE_PREFIX};
use bringup_shared::errors::{BringupError, BringupResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// Logs go to stderr, filtered by `RUST_LOG` (default `info`). With a
/// `log_dir`, they are also written to a daily-rolling file there; keep the
/// returned guard alive until exit or buffered lines are lost.
///
/// Calling this when a subscriber is already installed is not an error; the
/// existing subscriber stays in place.
pub fn init_logging(log_dir: Option<&Path>) -> BringupResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                BringupError::Config(format!("Failed to create log directory {}: {}", dir.display(), e))
            })?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }

    Ok(guard)
}
