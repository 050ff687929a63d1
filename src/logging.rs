//! Tracing setup: a compact stdout layer plus an optional append-only file layer.
//!
//! `RUST_LOG` overrides the default filter. The file location comes from
//! [`Config::log_file`](crate::config::Config::log_file).

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Install the global subscriber, returning the file writer's guard when file logging is on.
///
/// The guard flushes buffered lines when dropped, so hold it until shutdown. If the log file
/// cannot be opened the server keeps running with stdout logging and reports why.
pub fn init_tracing(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let mut open_error = None;
    let (file_layer, guard) = match log_file.map(open_log_file) {
        Some(Ok(file)) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).compact();
            (Some(layer), Some(guard))
        }
        Some(Err(error)) => {
            open_error = Some(error);
            (None, None)
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .init();

    if let (Some(path), Some(error)) = (log_file, open_error) {
        tracing::warn!(path = %path.display(), error = %error, "File logging disabled");
    }
    guard
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Open `path` for appending, creating missing parent directories.
fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
