//! Configuration: optional TOML file, then environment overrides.
//!
//! Lookup order for the file: explicit path, `BEAM_CONFIG`, `./beam.toml`.
//! Every field has a default, so running without a file is fine.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversation::TypingOptions;
use crate::error::ReconnectPolicy;
use crate::workload::CapacityPolicy;

const DEFAULT_CONFIG_FILE: &str = "beam.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub realtime: RealtimeConfig,
    pub capacity: CapacityPolicy,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Bearer token sent with every request
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api".to_string(),
            token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Relay WebSocket endpoint
    pub url: String,
    pub typing_timeout_ms: u64,
    pub typing_throttle_ms: u64,
    pub history_page_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/ws".to_string(),
            typing_timeout_ms: 3_000,
            typing_throttle_ms: 2_000,
            history_page_size: 100,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl RealtimeConfig {
    pub fn typing_options(&self) -> TypingOptions {
        TypingOptions {
            timeout: Duration::from_millis(self.typing_timeout_ms),
            throttle: Duration::from_millis(self.typing_throttle_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    pub level: String,
    /// Write daily-rolling log files here instead of stderr
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl Config {
    /// Load configuration from file and process environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("BEAM_CONFIG").map(PathBuf::from))
            .or_else(|| {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.exists().then_some(default)
            });

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::from_toml_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `BEAM_*` overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("BEAM_API_URL") {
            self.api.base_url = url;
        }
        if let Some(token) = lookup("BEAM_API_TOKEN") {
            self.api.token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(url) = lookup("BEAM_REALTIME_URL") {
            self.realtime.url = url;
        }
        if let Some(level) = lookup("BEAM_LOG") {
            self.log.level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let realtime = &self.realtime;
        if realtime.typing_timeout_ms == 0 {
            bail!("invalid config: realtime.typing_timeout_ms must be positive");
        }
        // A continuously typing user must be renewed before they expire
        if realtime.typing_throttle_ms >= realtime.typing_timeout_ms {
            bail!(
                "invalid config: realtime.typing_throttle_ms ({}) must be shorter than typing_timeout_ms ({})",
                realtime.typing_throttle_ms,
                realtime.typing_timeout_ms
            );
        }
        if realtime.history_page_size == 0 {
            bail!("invalid config: realtime.history_page_size must be positive");
        }
        let reconnect = &realtime.reconnect;
        if !(0.0..=1.0).contains(&reconnect.jitter) {
            bail!("invalid config: realtime.reconnect.jitter ({}) must be between 0 and 1", reconnect.jitter);
        }
        if !(reconnect.backoff_multiplier.is_finite() && reconnect.backoff_multiplier >= 0.0) {
            bail!(
                "invalid config: realtime.reconnect.backoff_multiplier ({}) must be a non-negative number",
                reconnect.backoff_multiplier
            );
        }
        if !(self.capacity.warn_above > 0.0 && self.capacity.warn_above <= self.capacity.discourage_above) {
            bail!(
                "invalid config: capacity.warn_above ({}) must be positive and not above discourage_above ({})",
                self.capacity.warn_above,
                self.capacity.discourage_above
            );
        }
        Ok(())
    }
}
