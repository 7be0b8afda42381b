use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::http::parser::MAX_HEAD_BYTES;

/// Top-level configuration file layout.
///
/// ```yaml
/// client:
///   timeout_ms: 5000
///   keep_alive: false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
}

/// Settings applied to every connection a session opens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection lifetime limit in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    /// Period of the timer that checks the limit.
    pub timer_resolution_ms: u64,
    /// Ask for persistent connections.
    pub keep_alive: bool,
    /// Sent as `User-Agent`; empty means no header.
    pub user_agent: String,
    /// Accumulate body bytes into `Response::body` as well as streaming them.
    pub collect_body: bool,
    pub max_head_bytes: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            timer_resolution_ms: 10,
            keep_alive: true,
            user_agent: format!("courier/{}", env!("CARGO_PKG_VERSION")),
            collect_body: true,
            max_head_bytes: MAX_HEAD_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Timer period, never below one millisecond.
    pub fn timer_resolution(&self) -> Duration {
        Duration::from_millis(self.timer_resolution_ms.max(1))
    }
}

impl Config {
    /// Loads the file named by `COURIER_CONFIG` (defaults when unset), then
    /// applies `COURIER_TIMEOUT_MS` and `COURIER_USER_AGENT`.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("COURIER_CONFIG") {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(ms) = std::env::var("COURIER_TIMEOUT_MS") {
            cfg.client.timeout_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("COURIER_TIMEOUT_MS is not a number: {:?}", ms))?;
        }
        if let Ok(agent) = std::env::var("COURIER_USER_AGENT") {
            cfg.client.user_agent = agent;
        }

        Ok(cfg)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}
