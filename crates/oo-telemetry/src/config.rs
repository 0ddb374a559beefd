//! Telemetry configuration from environment variables.

use std::env;

/// Configuration for poster logging and metrics.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to every log line
    pub service_name: String,

    /// Log level filter (trace, debug, info, warn, error)
    pub log_level: String,

    /// Whether to enable console output (for development)
    pub console_output: bool,

    /// Whether to enable JSON formatted logs
    pub json_logs: bool,

    /// Network identifier (mainnet, testnet, local)
    pub network: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "open-oracle-poster".to_string(),
            log_level: "info".to_string(),
            console_output: true,
            json_logs: false,
            network: "local".to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `OTEL_SERVICE_NAME`: Service name (default: open-oracle-poster)
    /// - `OO_LOG_LEVEL` or `RUST_LOG`: Log level (default: info)
    /// - `OO_CONSOLE_OUTPUT`: Enable console output (default: true)
    /// - `OO_JSON_LOGS`: Enable JSON logs (default: false in dev, true in containers)
    /// - `OO_NETWORK`: Network name (default: local)
    pub fn from_env() -> Self {
        let is_container =
            env::var("KUBERNETES_SERVICE_HOST").is_ok() || env::var("DOCKER_CONTAINER").is_ok();

        Self {
            service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "open-oracle-poster".to_string()),

            log_level: env::var("OO_LOG_LEVEL")
                .or_else(|_| env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string()),

            console_output: env::var("OO_CONSOLE_OUTPUT")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(true),

            json_logs: env::var("OO_JSON_LOGS")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(is_container),

            network: env::var("OO_NETWORK").unwrap_or_else(|_| "local".to_string()),
        }
    }

    /// Service name qualified by network, e.g. `open-oracle-poster-mainnet`.
    pub fn full_service_name(&self) -> String {
        if self.network == "local" {
            self.service_name.clone()
        } else {
            format!("{}-{}", self.service_name, self.network)
        }
    }
}
