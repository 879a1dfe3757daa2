//! Logging and observability helpers.
//!
//! Structured JSON logs of the reconciliation service, rotated daily under
//! the configured log directory.

pub mod sensitive;

pub use sensitive::Sensitive;

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::{SyncConfig, DEFAULT_LOG_FILTER};

const LOG_FILE_PREFIX: &str = "lineage-sync.log";
const LOG_RETENTION_DAYS: u64 = 14;

/// Installs the JSON file subscriber for the service described by `config`
///
/// `RUST_LOG` overrides `config.log_filter`. Panics are logged with the
/// service name before the previous hook runs.
pub fn init_tracing(config: &SyncConfig, log_dir: &Path) {
    let _ = fs::create_dir_all(log_dir);

    match cleanup_old_logs(log_dir, LOG_RETENTION_DAYS) {
        Ok(0) => {}
        Ok(removed) => eprintln!("Removed {} expired log files from {:?}", removed, log_dir),
        Err(e) => eprintln!("Failed to clean up old logs: {}", e),
    }

    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(log_filter(&config.log_filter))
        .with_writer(file_appender)
        .json()
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();

    let service = config.server_name.clone();
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let cause = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        tracing::error!(
            target: "panic",
            service = %service,
            location = %location,
            cause = %cause,
            "Reconciliation service panicked"
        );
        previous_hook(panic_info);
    }));

    tracing::info!(
        service = %config.server_name,
        data_dir = ?config.data_dir,
        log_dir = ?log_dir,
        "Tracing initialized"
    );
}

/// `RUST_LOG` if set, else `configured`, else the built-in default
fn log_filter(configured: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    EnvFilter::try_new(configured).unwrap_or_else(|e| {
        eprintln!("Invalid log filter {:?}, using default: {}", configured, e);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) -> std::io::Result<usize> {
    let now = SystemTime::now();
    let retention = Duration::from_secs(retention_days * 24 * 60 * 60);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_ours {
            continue;
        }

        let age = fs::metadata(&path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if let Some(age) = age {
            if age > retention {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
                }
            }
        }
    }
    Ok(removed)
}
