//! Log file setup for the vault.
//!
//! Spans of vault operations are written to a daily file next to the config;
//! secrets never reach a span field.

use std::fs;
use std::path::PathBuf;

use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::config::{self, VaultConfig};

const LOG_FILE_PREFIX: &str = "keychain-sample.log";

/// Installs a daily rolling file subscriber; a second call is a no-op.
pub fn init_tracing(config: &VaultConfig) {
    let log_dir = log_directory();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("keychain-sample: cannot create {}: {}", log_dir.display(), e);
        return;
    }

    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(file_appender)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Logs share the config's app directory
pub fn log_directory() -> PathBuf {
    config::app_directory().join("logs")
}

fn default_filter(config: &VaultConfig) -> String {
    let level = config.log_level.trim();
    let level = if level.is_empty() { "info" } else { level };
    format!("keychain_sample={}", level)
}
