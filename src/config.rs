use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use crate::fill::PollOptions;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
    pub execution: Option<ExecutionConfig>,
}

/// Per-exchange connection settings. JSON sources use camelCase keys, so the
/// common fields carry aliases.
#[derive(Deserialize, Clone, Default)]
pub struct ExchangeConfig {
    #[serde(alias = "apiKey")]
    pub api_key: Option<String>,

    #[serde(alias = "secret", alias = "apiSecret")]
    pub secret_key: Option<String>,

    #[serde(alias = "password")]
    pub passphrase: Option<String>,

    #[serde(alias = "baseUrl")]
    pub base_url: Option<String>,

    /// Separate futures host for venues that split spot and derivatives
    /// (Kraken, KuCoin).
    #[serde(alias = "futuresBaseUrl")]
    pub futures_base_url: Option<String>,

    #[serde(alias = "defaultType")]
    pub market_type: Option<String>,

    #[serde(alias = "recvWindow")]
    pub recv_window_ms: Option<u64>,

    #[serde(default)]
    pub enabled: bool,
}

impl ExchangeConfig {
    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn secret_key(&self) -> &str {
        self.secret_key.as_deref().unwrap_or_default()
    }

    pub fn passphrase(&self) -> &str {
        self.passphrase.as_deref().unwrap_or_default()
    }
}

// Credentials never reach logs: Debug prints presence, not contents.
impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("futures_base_url", &self.futures_base_url)
            .field("market_type", &self.market_type)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Defaults for the fill-polling loop.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ExecutionConfig {
    pub max_wait_secs: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub return_on_partial: Option<bool>,
}

impl ExecutionConfig {
    pub fn poll_options(&self) -> PollOptions {
        let defaults = PollOptions::default();
        PollOptions {
            max_wait: self
                .max_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_wait),
            poll_interval: self
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            return_on_partial: self.return_on_partial.unwrap_or(defaults.return_on_partial),
        }
    }
}

impl Settings {
    /// Layered load: home config, project config, local overrides, then
    /// `GATEWAY_`-prefixed environment variables
    /// (e.g. `GATEWAY_EXCHANGES__KRAKEN__API_KEY`).
    pub fn new() -> Result<Self, ConfigError> {
        let home = env::var("HOME").unwrap_or_else(|_| ".".into());

        let s = Config::builder()
            .add_source(File::with_name(&format!("{home}/.venue-gateway/config")).required(false))
            .add_source(File::with_name("config/config").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
