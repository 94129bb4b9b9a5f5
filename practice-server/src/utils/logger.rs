//! Logging Infrastructure
//!
//! `RUST_LOG` wins over the configured level. With a log directory the
//! output goes to a daily rolling file instead of stdout.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger (stdout, `info`)
pub fn init_logger() {
    init_logger_with_file(None, None);
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "practice_server={level},shared={level},tower_http={level},security=info,sqlx=warn"
        ))
    })
}

/// Initialize the logger with optional file output
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true);

    if let Some(dir) = log_dir {
        let log_path = Path::new(dir);
        if let Err(e) = std::fs::create_dir_all(log_path) {
            eprintln!("Cannot create log directory {dir}: {e}; logging to stdout");
        } else {
            let file_appender = tracing_appender::rolling::daily(log_path, "practice-server");
            let _ = subscriber.with_ansi(false).with_writer(file_appender).try_init();
            return;
        }
    }

    let _ = subscriber.try_init();
}
