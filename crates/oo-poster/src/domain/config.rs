//! Poster configuration and validation
//!
//! # Example
//!
//! ```ignore
//! use oo_poster::domain::PosterConfigBuilder;
//!
//! let config = PosterConfigBuilder::new()
//!     .view_address(view)
//!     .attestors(vec![coinbase_reporter])
//!     .confirmation_timeout_ms(30_000)
//!     .build()
//!     .expect("Valid config");
//! ```

use super::entities::{Address, TxOptions};
use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Default write method of the Open Oracle view.
pub const DEFAULT_WRITE_METHOD: &str = "postPrices";
/// Default event emitted for every record the data contract stores.
pub const DEFAULT_WRITE_EVENT: &str = "Write";

/// Poster configuration.
///
/// Built once and passed to each component; nothing here changes while the
/// poster runs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PosterConfig {
    /// Contract the write transaction is sent to
    pub view_address: Address,
    /// Write method, resolved against the contract ABI at startup
    pub write_method: String,
    /// Event whose `source`/`key` fields confirm a stored record
    pub write_event: String,
    /// Sender, gas limit and gas price of write transactions
    pub tx: TxOptions,
    /// How long to wait for a receipt after broadcast
    pub confirmation_timeout_ms: u64,
    /// Records older than this are left out of aggregates
    pub max_observation_age_secs: u64,
    /// Attestors whose records make up an aggregate
    pub attestors: Vec<Address>,
}

impl Default for PosterConfig {
    fn default() -> Self {
        Self {
            view_address: Address::ZERO,
            write_method: DEFAULT_WRITE_METHOD.to_string(),
            write_event: DEFAULT_WRITE_EVENT.to_string(),
            tx: TxOptions::default(),
            confirmation_timeout_ms: 120_000, // 2 minutes
            max_observation_age_secs: 3_600,  // 1 hour
            attestors: Vec::new(),
        }
    }
}

impl PosterConfig {
    /// Parse a JSON document and validate it.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.view_address == Address::ZERO {
            return Err(ConfigError::InvalidAddress(
                "view_address must not be the zero address".to_string(),
            ));
        }

        if self.write_method.trim().is_empty() {
            return Err(ConfigError::InvalidParameters(
                "write_method cannot be empty".to_string(),
            ));
        }

        if self.write_event.trim().is_empty() {
            return Err(ConfigError::InvalidParameters(
                "write_event cannot be empty".to_string(),
            ));
        }

        if self.tx.gas == 0 {
            return Err(ConfigError::InvalidParameters(
                "tx.gas cannot be 0".to_string(),
            ));
        }

        if self.confirmation_timeout_ms == 0 {
            return Err(ConfigError::InvalidParameters(
                "confirmation_timeout_ms cannot be 0".to_string(),
            ));
        }

        if self.max_observation_age_secs == 0 {
            return Err(ConfigError::InvalidParameters(
                "max_observation_age_secs cannot be 0".to_string(),
            ));
        }

        if self.attestors.is_empty() {
            return Err(ConfigError::InvalidParameters(
                "at least one attestor is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.attestors.iter().find(|a| !seen.insert(**a)) {
            return Err(ConfigError::InvalidParameters(format!(
                "duplicate attestor {}",
                dup
            )));
        }

        Ok(())
    }

    /// Receipt wait window.
    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }

    /// Builder-style method to set the transaction options
    pub fn with_tx(mut self, tx: TxOptions) -> Self {
        self.tx = tx;
        self
    }

    /// Builder-style method to set the confirmation timeout
    pub fn with_confirmation_timeout_ms(mut self, ms: u64) -> Self {
        self.confirmation_timeout_ms = ms;
        self
    }
}

/// Builder for PosterConfig with validation
#[derive(Default)]
pub struct PosterConfigBuilder {
    view_address: Option<Address>,
    write_method: Option<String>,
    write_event: Option<String>,
    tx: Option<TxOptions>,
    confirmation_timeout_ms: Option<u64>,
    max_observation_age_secs: Option<u64>,
    attestors: Option<Vec<Address>>,
}

impl PosterConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the view contract address
    pub fn view_address(mut self, address: Address) -> Self {
        self.view_address = Some(address);
        self
    }

    /// Set the write method name
    pub fn write_method(mut self, method: impl Into<String>) -> Self {
        self.write_method = Some(method.into());
        self
    }

    /// Set the write event name
    pub fn write_event(mut self, event: impl Into<String>) -> Self {
        self.write_event = Some(event.into());
        self
    }

    /// Set sender, gas and gas price
    pub fn tx(mut self, tx: TxOptions) -> Self {
        self.tx = Some(tx);
        self
    }

    /// Set the receipt wait window in milliseconds
    pub fn confirmation_timeout_ms(mut self, ms: u64) -> Self {
        self.confirmation_timeout_ms = Some(ms);
        self
    }

    /// Set the maximum record age for aggregation
    pub fn max_observation_age_secs(mut self, secs: u64) -> Self {
        self.max_observation_age_secs = Some(secs);
        self
    }

    /// Set the attestors whose records are aggregated
    pub fn attestors(mut self, attestors: Vec<Address>) -> Self {
        self.attestors = Some(attestors);
        self
    }

    /// Build the PosterConfig, validating all parameters
    pub fn build(self) -> Result<PosterConfig, ConfigError> {
        let defaults = PosterConfig::default();

        let config = PosterConfig {
            view_address: self.view_address.unwrap_or(defaults.view_address),
            write_method: self.write_method.unwrap_or(defaults.write_method),
            write_event: self.write_event.unwrap_or(defaults.write_event),
            tx: self.tx.unwrap_or(defaults.tx),
            confirmation_timeout_ms: self
                .confirmation_timeout_ms
                .unwrap_or(defaults.confirmation_timeout_ms),
            max_observation_age_secs: self
                .max_observation_age_secs
                .unwrap_or(defaults.max_observation_age_secs),
            attestors: self.attestors.unwrap_or(defaults.attestors),
        };

        config.validate()?;
        Ok(config)
    }
}
