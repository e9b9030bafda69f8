//! Configuration loading and validation for the relay daemon.
//!
//! All values are read from environment variables at startup. The process
//! will exit with a clear error message if any required variable is missing
//! or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::access::ClientPolicy;

/// Validated relay configuration. Immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address the relay listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Remote endpoint every allowed connection is forwarded to. **Required.**
    pub remote_addr: String,

    /// The one IPv4 address permitted to use the relay. Every other caller
    /// gets the decoy response.
    #[serde(default = "default_allowed_client")]
    pub allowed_client: String,

    /// Process lifetime in seconds. Once elapsed, the listener closes and no
    /// further connections are accepted.
    #[serde(default = "default_lifetime_secs")]
    pub lifetime_secs: u64,

    /// Tracing log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:10001".into()
}
fn default_allowed_client() -> String {
    "127.0.0.1".into()
}
fn default_lifetime_secs() -> u64 {
    900
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be
    /// parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build relay configuration")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise relay configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.bind_addr, "BIND_ADDR")?;
        ensure_non_empty(&self.remote_addr, "REMOTE_ADDR")?;
        if let Err(e) = ClientPolicy::from_literal(&self.allowed_client) {
            anyhow::bail!("ALLOWED_CLIENT is invalid: {e}");
        }
        if self.lifetime_secs == 0 {
            anyhow::bail!("LIFETIME_SECS must be > 0");
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
