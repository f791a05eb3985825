use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the background log writers alive. Dropping it flushes and stops them.
pub struct LogGuards {
    _file: WorkerGuard,
    _console: WorkerGuard,
}

/// Logs to stdout and to a daily-rotated `{service_name}.log` under `log_dir`.
/// The filter comes from `RUST_LOG`, defaulting to `info`.
pub fn init_logging(log_dir: &str, service_name: &str) -> Result<LogGuards> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {log_dir}"))?;
    let backup = rotate_logs_on_startup(log_dir, service_name)?;

    let file_appender = rolling::daily(log_dir, format!("{service_name}.log"));
    let (file_writer, file_guard) = non_blocking(file_appender);
    let (console_writer, console_guard) = non_blocking(std::io::stdout());

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let console_layer = fmt::layer()
        .with_writer(console_writer)
        .with_ansi(true)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Logging was already initialized")?;

    if let Some(backup) = backup {
        info!("Previous log file backed up to: {backup}");
    }
    info!("Logging initialized - logs will be written to {log_dir}/{service_name}.log");

    Ok(LogGuards {
        _file: file_guard,
        _console: console_guard,
    })
}

/// Moves an existing `{service_name}.log` aside with a timestamp suffix and
/// returns the backup path.
pub fn rotate_logs_on_startup(log_dir: &str, service_name: &str) -> Result<Option<String>> {
    let log_file = format!("{log_dir}/{service_name}.log");
    if !Path::new(&log_file).exists() {
        return Ok(None);
    }

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let backup_file = format!("{log_dir}/{service_name}.{timestamp}.log");
    std::fs::rename(&log_file, &backup_file)
        .with_context(|| format!("Failed to back up {log_file}"))?;

    Ok(Some(backup_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_moves_the_previous_log_aside() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().to_str().unwrap();
        std::fs::write(dir.path().join("sandpool.log"), "old run").unwrap();

        let backup = rotate_logs_on_startup(log_dir, "sandpool").unwrap().unwrap();

        assert!(!dir.path().join("sandpool.log").exists());
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "old run");
    }

    #[test]
    fn rotation_without_previous_log_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let backup = rotate_logs_on_startup(dir.path().to_str().unwrap(), "sandpool").unwrap();
        assert!(backup.is_none());
    }
}
