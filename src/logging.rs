//! Tracing configuration and log routing.
//!
//! Every event goes to stdout through a compact formatter. A second, file-backed layer is
//! added unless `STUDYASSIST_LOG_FILE=off`:
//!
//! - `STUDYASSIST_LOG_FILE=<path>` appends to that exact file.
//! - otherwise `STUDYASSIST_LOG_DIR` (default `logs`) receives `studyassist.log`, rotated
//!   according to `STUDYASSIST_LOG_ROTATION` (`never`, `daily`, or `hourly`).
//!
//! The file writer is non-blocking so job progress updates never wait on disk.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{self, RollingFileAppender};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const LOG_FILE_NAME: &str = "studyassist.log";

/// Where the file layer writes, as resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    Exact(PathBuf),
    Directory { dir: PathBuf, rotation: Rotation },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    Never,
    Daily,
    Hourly,
}

/// Configure tracing subscribers for stdout and optional file logging.
///
/// Respects `RUST_LOG` for filtering and defaults to `info`.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = resolve_target(
        std::env::var("STUDYASSIST_LOG_FILE").ok(),
        std::env::var("STUDYASSIST_LOG_DIR").ok(),
        std::env::var("STUDYASSIST_LOG_ROTATION").ok(),
    );

    match open_writer(&target) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn resolve_target(
    file: Option<String>,
    dir: Option<String>,
    rotation: Option<String>,
) -> FileTarget {
    match file.as_deref().map(str::trim) {
        Some("off") | Some("none") => return FileTarget::Disabled,
        Some(path) if !path.is_empty() => return FileTarget::Exact(PathBuf::from(path)),
        _ => {}
    }

    let dir = dir
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("logs"));
    let rotation = match rotation.as_deref().map(str::to_lowercase).as_deref() {
        Some("daily") => Rotation::Daily,
        Some("hourly") => Rotation::Hourly,
        _ => Rotation::Never,
    };
    FileTarget::Directory { dir, rotation }
}

/// Build a non‑blocking writer for the resolved target.
///
/// Returns `None` when file logging is disabled or the destination cannot be opened.
fn open_writer(target: &FileTarget) -> Option<NonBlocking> {
    let (non_blocking, guard) = match target {
        FileTarget::Disabled => return None,
        FileTarget::Exact(path) => {
            match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
            {
                Ok(file) => tracing_appender::non_blocking(file),
                Err(err) => {
                    eprintln!("Failed to open log file {}: {err}", path.display());
                    return None;
                }
            }
        }
        FileTarget::Directory { dir, rotation } => {
            if let Err(err) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create logs directory {}: {err}", dir.display());
                return None;
            }
            let appender: RollingFileAppender = match rotation {
                Rotation::Never => rolling::never(dir, LOG_FILE_NAME),
                Rotation::Daily => rolling::daily(dir, LOG_FILE_NAME),
                Rotation::Hourly => rolling::hourly(dir, LOG_FILE_NAME),
            };
            tracing_appender::non_blocking(appender)
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
