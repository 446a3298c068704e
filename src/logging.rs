/*!
 * Logging and tracing initialization
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::TransferConfig;
use crate::error::{Result, TransferError};

/// Level used for the crate's own targets when `RUST_LOG` is unset
pub fn effective_level(config: &TransferConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.log_level.to_tracing_level()
    }
}

/// Filter directive used when `RUST_LOG` is unset
fn default_directive(config: &TransferConfig) -> String {
    format!("bucketferry={}", effective_level(config))
}

/// Initialize structured logging based on configuration
pub fn init_logging(config: &TransferConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(config)))
        .map_err(|e| TransferError::Config(format!("Failed to create log filter: {}", e)))?;

    if let Some(ref log_path) = config.log_file {
        init_file_logging(log_path, env_filter)?;
    } else {
        init_console_logging(env_filter);
    }

    Ok(())
}

fn init_console_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

/// JSON lines to a file, one object per event
fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> Result<()> {
    let file = File::create(log_path).map_err(|e| {
        TransferError::Config(format!(
            "Failed to create log file {}: {}",
            log_path.display(),
            e
        ))
    })?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}

/// Initialize logging with custom format for testing
#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("bucketferry=debug"));

        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .ok(); // Ignore error if already initialized
    });
}
