//! Logging and tracing configuration
//!
//! Stdout carries the DAP stream, so nothing may ever be logged there.
//! Logs go to stderr and optionally to a file.

use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::paths;

/// Initialize tracing for the adapter
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
///
/// When `log_file` is set, records are also appended to that file through a
/// non-blocking writer. The returned guard must be kept alive for the whole
/// process, or buffered lines are lost.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("engine_dap=info,warn"));

    let (file_layer, guard) = match log_file.map(file_writer) {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    guard
}

/// Non-blocking appender for `log_file`, creating its directory
fn file_writer(log_file: &Path) -> (NonBlocking, WorkerGuard) {
    let dir = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .or_else(paths::log_dir)
        .unwrap_or_else(std::env::temp_dir);
    let file_name = log_file
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "engine-dap.log".into());

    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Warning: Could not create log directory {}: {}", dir.display(), e);
    }

    let appender = tracing_appender::rolling::never(dir, file_name);
    tracing_appender::non_blocking(appender)
}
