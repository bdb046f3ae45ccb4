//! Runtime configuration.
//!
//! Layered with the `config` crate: built-in defaults, an optional file, then
//! `IPL_SYNC_*` environment variables (nested keys split on `__`, e.g.
//! `IPL_SYNC_REALTIME__TOPIC`), then the bare `BACKEND_ORIGIN` variable.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::net::join_under;

pub const DEFAULT_BACKEND_ORIGIN: &str = "https://ipl-dashboard-1-ff0d.onrender.com";
pub const ORIGIN_OVERRIDE_VAR: &str = "BACKEND_ORIGIN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid base origin {origin:?}: {reason}")]
    Origin { origin: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_origin: String,
    pub log_filter: String,
    pub warmup: WarmupSettings,
    pub realtime: RealtimeSettings,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_origin: DEFAULT_BACKEND_ORIGIN.to_string(),
            log_filter: "info".to_string(),
            warmup: WarmupSettings::default(),
            realtime: RealtimeSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WarmupSettings {
    pub probe_path: String,
    pub probe_timeout_ms: u64,
    pub settle_delay_ms: u64,
    pub prefetch_paths: Vec<String>,
    pub prefetch_timeout_ms: u64,
    pub max_deferral_ms: u64,
}

impl Default for WarmupSettings {
    fn default() -> Self {
        Self {
            probe_path: "/api/ping".to_string(),
            probe_timeout_ms: 10_000,
            settle_delay_ms: 400,
            prefetch_paths: vec![
                "/api/v1/team".to_string(),
                "/api/v1/players".to_string(),
                "/api/v1/iconic-match".to_string(),
            ],
            prefetch_timeout_ms: 15_000,
            max_deferral_ms: 2_000,
        }
    }
}

impl WarmupSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn prefetch_timeout(&self) -> Duration {
        Duration::from_millis(self.prefetch_timeout_ms)
    }

    pub fn max_deferral(&self) -> Duration {
        Duration::from_millis(self.max_deferral_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeSettings {
    pub endpoint_path: String,
    pub topic: String,
    pub reconnect_delay_ms: u64,
    pub connect_timeout_ms: u64,
    pub fallback_path: String,
    pub fallback_timeout_ms: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            endpoint_path: "/ws".to_string(),
            topic: "/topic/live-score".to_string(),
            reconnect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
            fallback_path: "/api/v1/iconic-match".to_string(),
            fallback_timeout_ms: 10_000,
        }
    }
}

impl RealtimeSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }
}

impl SyncConfig {
    /// Load and validate configuration. `path` is an optional config file;
    /// its format is picked from the extension.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let cfg = builder
            .add_source(
                Environment::with_prefix("IPL_SYNC")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("warmup.prefetch_paths")
                    .try_parsing(true),
            )
            .set_override_option("base_origin", std::env::var(ORIGIN_OVERRIDE_VAR).ok())?
            .build()?;

        let mut config: SyncConfig = cfg.try_deserialize()?;
        config.normalise();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults. No environment lookup.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(File::from_str(content, config::FileFormat::Toml))
            .build()?;
        let mut config: SyncConfig = cfg.try_deserialize()?;
        config.normalise();
        config.validate()?;
        Ok(config)
    }

    pub fn base_origin(&self) -> &str {
        &self.base_origin
    }

    /// WebSocket URL of the realtime endpoint, derived from the base origin.
    pub fn realtime_url(&self) -> Result<String, ConfigError> {
        let mut url = self.parsed_origin()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| ConfigError::Origin {
            origin: self.base_origin.clone(),
            reason: "cannot derive websocket scheme".to_string(),
        })?;
        let url = join_under(&url, &self.realtime.endpoint_path).map_err(|reason| ConfigError::Origin {
            origin: self.base_origin.clone(),
            reason,
        })?;
        Ok(url.to_string())
    }

    fn normalise(&mut self) {
        let trimmed = self.base_origin.trim().trim_end_matches('/');
        self.base_origin = if trimmed.is_empty() {
            DEFAULT_BACKEND_ORIGIN.to_string()
        } else {
            trimmed.to_string()
        };
    }

    fn parsed_origin(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_origin).map_err(|e| ConfigError::Origin {
            origin: self.base_origin.clone(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::Origin {
                origin: self.base_origin.clone(),
                reason: format!("unsupported scheme {other}"),
            }),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.parsed_origin()?;
        let checks = [
            ("warmup.probe_timeout_ms", self.warmup.probe_timeout_ms),
            ("warmup.prefetch_timeout_ms", self.warmup.prefetch_timeout_ms),
            ("warmup.max_deferral_ms", self.warmup.max_deferral_ms),
            ("realtime.reconnect_delay_ms", self.realtime.reconnect_delay_ms),
            ("realtime.connect_timeout_ms", self.realtime.connect_timeout_ms),
            ("realtime.fallback_timeout_ms", self.realtime.fallback_timeout_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        Ok(())
    }
}
