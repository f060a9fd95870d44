//! Tracing configuration and log routing.
//!
//! Logs go to stdout with a compact formatter and to a file. `RAG_LOG_FILE` selects the file;
//! without it logs land in `logs/multimodal-rag.log`. The console `chat` loop passes
//! `stdout = false` so log lines do not interleave with the conversation.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "multimodal-rag.log";

/// Configure tracing subscribers for stdout (optional) and file logging.
///
/// Respects `RUST_LOG` for filtering (defaults to `info`).
pub fn init_tracing(stdout: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = stdout.then(|| fmt::layer().with_target(false).compact());
    let file_layer = configure_file_writer().map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when the target directory or file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let (dir, file) = match std::env::var("RAG_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => split_log_path(Path::new(path.trim()))?,
        _ => (DEFAULT_LOG_DIR.to_string(), DEFAULT_LOG_FILE.to_string()),
    };
    if let Err(err) = std::fs::create_dir_all(&dir) {
        eprintln!("Failed to create log directory {dir}: {err}");
        return None;
    }
    let appender = tracing_appender::rolling::never(&dir, &file);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}

fn split_log_path(path: &Path) -> Option<(String, String)> {
    let file = path.file_name()?.to_string_lossy().into_owned();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => ".".to_string(),
    };
    Some((dir, file))
}
