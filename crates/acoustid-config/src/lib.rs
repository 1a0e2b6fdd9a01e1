// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcoustidConfig {
    /// Application API key sent with every request.
    pub api_key: Option<String>,
    /// User API key, needed only for submissions.
    pub user_key: Option<String>,
    pub base_url: String,
    /// Minimum time between requests; 0 disables pacing.
    pub request_interval_ms: u64,
    /// Per-request timeout; 0 means no timeout.
    pub timeout_secs: u64,
    pub meta: String,
}

impl AcoustidConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_millis(self.request_interval_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for AcoustidConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            user_key: None,
            base_url: "https://api.acoustid.org/v2".to_string(),
            request_interval_ms: 333,
            timeout_secs: 0,
            meta: "recordings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FingerprintConfig {
    /// Seconds of audio used for fingerprints.
    pub max_length_secs: u32,
    /// `fpcalc` executable; falls back to `$FPCALC`, then `fpcalc`.
    pub fpcalc_path: Option<String>,
    pub force_fpcalc: bool,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            max_length_secs: 120,
            fpcalc_path: None,
            force_fpcalc: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    pub acoustid: AcoustidConfig,
    pub fingerprint: FingerprintConfig,
    pub telemetry: TelemetryConfig,
}

/// Load configuration from defaults, optional TOML file, and environment overrides (prefix: ACOUSTID_).
pub fn load(config_path: Option<&Path>) -> Result<AppConfig> {
    let config: AppConfig = figment(config_path).extract()?;
    info!(target: "config", "configuration loaded");
    Ok(config)
}

fn figment(config_path: Option<&Path>) -> Figment {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }

    figment.merge(Env::prefixed("ACOUSTID_").split("__"))
}
