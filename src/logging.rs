use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_rolling_file::{RollingConditionBase, RollingFileAppender};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::LoggingConfig;

/// Guard wrapper that ensures logs are flushed on drop
pub struct LogGuard(Option<WorkerGuard>);

impl Drop for LogGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.0.take() {
            drop(guard);
            // Give the background writer a moment to finish flushing
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging to console and optionally to a size-rolled file.
///
/// `verbose` forces DEBUG regardless of the configured level.
/// Returns a LogGuard that must be kept alive for the duration of the program.
pub fn init_logging(
    config: Option<&LoggingConfig>,
    verbose: bool,
) -> Result<LogGuard, anyhow::Error> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.map_or(Level::INFO, |c| parse_level(&c.level))
    };

    let console = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level));

    let Some(config) = config else {
        tracing_subscriber::registry().with(console).init();
        return Ok(LogGuard(None));
    };

    if let Some(parent) = Path::new(&config.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let file_appender = RollingFileAppender::new(
        &config.path,
        RollingConditionBase::new().max_size(config.size * 1024 * 1024),
        config.max_files,
    )
    .map_err(|e| anyhow::anyhow!("Failed to create rolling file appender: {}", e))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(console)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(tracing_subscriber::filter::LevelFilter::from_level(level)),
        )
        .init();

    Ok(LogGuard(Some(guard)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(parse_level("WARNING"), Level::WARN);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level("loud"), Level::INFO);
    }
}
