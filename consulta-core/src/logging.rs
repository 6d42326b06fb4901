//! File logging for the `consulta` binary
//!
//! Stdout carries command output, so tracing goes to
//! `$XDG_STATE_HOME/consulta/consulta.log`, rotated daily.

use crate::config::{Config, LoggingConfig};
use crate::error::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const FALLBACK_LEVEL: &str = "info";

/// Install the file subscriber.
///
/// `RUST_LOG` overrides `logging.level`. Hold the returned guard until exit,
/// dropping it flushes buffered lines.
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("consulta.log")
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log file appender: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = level_filter(std::env::var("RUST_LOG").ok(), &config.level);

    // A second init in one process keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true),
        )
        .try_init();

    tracing::info!(
        log_file = %Config::log_path().display(),
        level = %config.level,
        max_files = config.max_files,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Route `RUST_LOG`-filtered events to the libtest capture. Safe to call from
/// every test.
pub fn init_test() {
    let _ = fmt::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Flushes the non-blocking writer on drop
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn level_filter(env: Option<String>, configured: &str) -> EnvFilter {
    env.filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_LEVEL))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_directives_win() {
        let filter = level_filter(Some("debug".to_string()), "warn");
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn test_configured_level_without_env() {
        assert_eq!(level_filter(None, "warn").to_string(), "warn");
        assert_eq!(level_filter(Some("  ".to_string()), "error").to_string(), "error");
    }

    #[test]
    fn test_unparseable_levels_fall_back() {
        let filter = level_filter(Some("consulta=loud".to_string()), "app=shouting");
        assert_eq!(filter.to_string(), FALLBACK_LEVEL);
    }
}
