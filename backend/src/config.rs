//! Startup settings loaded via OrthoConfig.
//!
//! Every field can be supplied as a CLI flag, an environment variable with the
//! `SCHEDULER_` prefix (for example `SCHEDULER_REDIS_URL`) or a config file.
//! [`SchedulerSettings::into_runtime`] turns the raw settings into a validated
//! [`SchedulerConfig`]; a missing or invalid required value is a startup error.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    DEFAULT_KEY_NAMESPACE, KeyCodec, KeyNamespaceError, RetryPolicy, RetryPolicyError,
};

/// Raw scheduler settings as loaded from flags, environment and files.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SCHEDULER")]
pub struct SchedulerSettings {
    /// Backing store connection string, e.g. `redis://localhost:6379/0`.
    pub redis_url: Option<String>,
    /// Token expected in inbound `Authorization` headers and sent on webhooks.
    pub api_auth: Option<String>,
    /// HTTP listen port.
    pub port: Option<u16>,
    /// Maximum delivery retries; `-1` retries forever.
    pub retries: Option<i64>,
    /// Seconds between retries.
    pub retry_time: Option<u64>,
    /// Record key namespace; timers live under `<namespace>-ref`.
    pub key_namespace: Option<String>,
    /// Cap on concurrent firings. Unbounded when absent.
    pub max_concurrent_deliveries: Option<usize>,
    /// Re-arm records that lost their timer at startup and on resubscribe.
    /// Read from the environment or config file only; unset means enabled.
    #[ortho_config(skip_cli)]
    pub recover_orphans: Option<bool>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Redis connection URL.
    pub redis_url: String,
    /// Shared secret for inbound auth and outbound webhooks.
    pub api_token: String,
    /// HTTP listen port.
    pub port: u16,
    /// Retry budget and interval.
    pub retry_policy: RetryPolicy,
    /// Store key layout.
    pub codec: KeyCodec,
    /// Optional cap on concurrent firings.
    pub max_concurrent_deliveries: Option<usize>,
    /// Whether the orphan sweep runs.
    pub recover_orphans: bool,
}

/// Reasons the settings cannot be turned into a [`SchedulerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting was not supplied.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    /// A required string setting was supplied but blank.
    #[error("setting `{0}` must not be empty")]
    Blank(&'static str),
    /// Retry settings are out of range.
    #[error(transparent)]
    Retry(#[from] RetryPolicyError),
    /// Key namespace is unusable.
    #[error(transparent)]
    Namespace(#[from] KeyNamespaceError),
    /// A concurrency cap of zero would never fire anything.
    #[error("max_concurrent_deliveries must be at least 1")]
    ZeroConcurrency,
}

fn required<T>(value: Option<T>, name: &'static str) -> Result<T, ConfigError> {
    value.ok_or(ConfigError::Missing(name))
}

fn required_text(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    let text = required(value, name)?;
    if text.trim().is_empty() {
        return Err(ConfigError::Blank(name));
    }
    Ok(text)
}

impl SchedulerSettings {
    /// Return the configured key namespace, falling back to the default.
    pub fn key_namespace(&self) -> &str {
        self.key_namespace
            .as_deref()
            .unwrap_or(DEFAULT_KEY_NAMESPACE)
    }

    /// Validate the raw settings.
    ///
    /// # Errors
    /// Returns [`ConfigError`] for any missing or invalid value.
    pub fn into_runtime(self) -> Result<SchedulerConfig, ConfigError> {
        let codec = KeyCodec::new(self.key_namespace())?;
        let retry_policy = RetryPolicy::from_settings(
            required(self.retries, "retries")?,
            required(self.retry_time, "retry_time")?,
        )?;
        if self.max_concurrent_deliveries == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(SchedulerConfig {
            redis_url: required_text(self.redis_url, "redis_url")?,
            api_token: required_text(self.api_auth, "api_auth")?,
            port: required(self.port, "port")?,
            retry_policy,
            codec,
            max_concurrent_deliveries: self.max_concurrent_deliveries,
            recover_orphans: self.recover_orphans.unwrap_or(true),
        })
    }
}
