use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Service prefix must start with '/' and not end with one: {0}")]
    InvalidPrefix(String),

    #[error("Timeouts must be non-zero")]
    ZeroTimeout,

    #[error("Trial period must be at least one day")]
    EmptyTrialPeriod,
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Where a backend service lives.
///
/// Note: Uses the `url::Url` type for compile-time URL validation.
/// Invalid URLs will be rejected during config deserialization.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ServiceConfig {
    pub url: Url,
    /// Path prefix prepended to every endpoint, e.g. "/api/v1".
    #[serde(default)]
    pub prefix: String,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.prefix.is_empty() {
            return Ok(());
        }
        if !self.prefix.starts_with('/') || self.prefix.ends_with('/') {
            return Err(ValidationError::InvalidPrefix(self.prefix.clone()));
        }
        Ok(())
    }
}

/// Per-request timeouts toward the backends, in seconds.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Timeouts {
    #[serde(default = "default_read_secs")]
    pub read_secs: u64,
    #[serde(default = "default_write_secs")]
    pub write_secs: u64,
}

fn default_read_secs() -> u64 {
    5
}

fn default_write_secs() -> u64 {
    10
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            read_secs: default_read_secs(),
            write_secs: default_write_secs(),
        }
    }
}

impl Timeouts {
    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn write(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.read_secs == 0 || self.write_secs == 0 {
            return Err(ValidationError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Attributes of the payment record opened for every freshly created user.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct PaymentDefaults {
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_trial")]
    pub trial: bool,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_trial_days")]
    pub trial_days: u32,
}

fn default_currency() -> String {
    "RUB".into()
}

fn default_trial() -> bool {
    true
}

fn default_period() -> String {
    "month".into()
}

fn default_trial_days() -> u32 {
    30
}

impl Default for PaymentDefaults {
    fn default() -> Self {
        PaymentDefaults {
            currency: default_currency(),
            trial: default_trial(),
            period: default_period(),
            trial_days: default_trial_days(),
        }
    }
}

/// Which cache store backs the gateway.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
#[serde(tag = "type")]
pub enum CacheConfig {
    Redis { url: String },
    /// Process-local map. Loses entries on restart; fine for development.
    Memory,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    pub data_service: ServiceConfig,
    pub payment_service: ServiceConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub payment_defaults: PaymentDefaults,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.data_service.validate()?;
        self.payment_service.validate()?;
        self.timeouts.validate()?;

        if self.payment_defaults.trial_days == 0 {
            return Err(ValidationError::EmptyTrialPeriod);
        }

        Ok(())
    }
}
