// file: src/logging/logger.rs
// version: 2.0.0
// guid: 8f2b6c4e-71d3-4a09-b5e2-0c6a9d3f1e27

//! Logger initialization and configuration

use crate::Result;
use tracing::Instrument;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system
pub fn init_logger(verbose: bool, quiet: bool) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()
        .map_err(|e| crate::UpgradeError::config(format!("Failed to initialize logger: {}", e)))?;

    Ok(())
}

/// Initialize structured JSON logging (for scripted runs)
pub fn init_json_logger() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .map_err(|e| {
            crate::UpgradeError::config(format!("Failed to initialize JSON logger: {}", e))
        })?;

    Ok(())
}

/// Run a device-scoped future inside a `device` span
pub async fn with_device_span<F, R>(host: &str, phase: &str, fut: F) -> R
where
    F: std::future::Future<Output = R>,
{
    let span = tracing::info_span!("device", host = host, phase = phase);
    fut.instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logger_default() {
        // The global subscriber can only be set once per process, so either
        // outcome is acceptable here.
        let result = init_logger(false, false);
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_init_json_logger() {
        let result = init_json_logger();
        assert!(result.is_ok() || result.is_err());
    }

    #[tokio::test]
    async fn test_with_device_span_returns_value() {
        let result = with_device_span("sw-core-1", "inspect", async { 40 + 2 }).await;
        assert_eq!(result, 42);
    }
}
