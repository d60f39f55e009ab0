// Tracing setup
//
// The engine only emits `tracing` events; binaries decide where they go. This
// module holds the one subscriber setup shared by the CLI and tests.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Configuration for log output
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded on startup
    pub service_name: String,
    /// Whether to enable console logging
    pub enable_console: bool,
    /// Log filter (e.g., "info", "debug", "baysync_core=debug")
    pub log_filter: Option<String>,
    /// Include the event target (module path) in console output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "baysync".to_string(),
            enable_console: true,
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `BAYSYNC_SERVICE_NAME`: Service name (default: "baysync")
    /// - `RUST_LOG` or `BAYSYNC_LOG`: Log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("BAYSYNC_SERVICE_NAME")
                .unwrap_or_else(|_| "baysync".to_string()),
            enable_console: true,
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("BAYSYNC_LOG").ok()),
            with_target: true,
        }
    }

    /// Override the log filter
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed (tests call this more
/// than once per process).
///
/// # Example
///
/// ```ignore
/// use baysync_core::telemetry::{init_tracing, TelemetryConfig};
///
/// init_tracing(TelemetryConfig::from_env());
/// ```
pub fn init_tracing(config: TelemetryConfig) -> bool {
    let filter = config
        .log_filter
        .as_ref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let console_layer = if config.enable_console {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(config.with_target)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "baysync");
        assert!(config.enable_console);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_second_init_is_refused() {
        let config = TelemetryConfig::default().with_log_filter("warn");
        init_tracing(config.clone());
        assert!(!init_tracing(config));
    }
}
