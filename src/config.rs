//! Configuration file parser for ~/.config/vigil/config.toml.
//!
//! The config file is optional — a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields`
//! off), though we log a warning when the file contains potential typos.

use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::util::{self, UrlError};

/// REST collection path for posts, relative to `base_url`.
pub const API_PATH: &str = "/api_root/Post/";
/// Push-notification endpoint, relative to `base_url`.
pub const WS_PATH: &str = "/ws/notifications/";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid base_url: {0}")]
    BaseUrl(#[from] UrlError),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be
/// specified. Missing keys fall back to `Default::default()`.
///
/// The custom Debug impl masks `auth_token` to keep the bearer token out of
/// logs and error output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server base URL; the REST and push endpoints are derived from it.
    pub base_url: String,

    /// Static bearer token for the REST API (alternative to the
    /// VIGIL_TOKEN env var; the env var takes precedence).
    pub auth_token: Option<String>,

    /// Fixed `author` field sent with published posts.
    pub author_id: String,

    /// Connect/read timeout for REST calls, in seconds.
    pub http_timeout_secs: u64,

    /// Delay before retrying a failed push connection, in seconds.
    pub reconnect_delay_secs: u64,

    /// Keepalive ping cadence on the push connection, in seconds.
    pub ping_interval_secs: u64,

    /// Override for the cache directory (snapshot + assets).
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            auth_token: None,
            author_id: "1".to_string(),
            http_timeout_secs: 5,
            reconnect_delay_secs: 5,
            ping_interval_secs: 30,
            data_dir: None,
        }
    }
}

/// Mask auth_token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("base_url", &self.base_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("author_id", &self.author_id)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("ping_interval_secs", &self.ping_interval_secs)
            .field("data_dir", &self.data_dir)
            .finish()
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            let known_keys = [
                "base_url",
                "auth_token",
                "author_id",
                "http_timeout_secs",
                "reconnect_delay_secs",
                "ping_interval_secs",
                "data_dir",
            ];
            for key in raw.keys() {
                if !known_keys.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), base_url = %config.base_url, "Loaded configuration");
        Ok(config)
    }

    /// Bearer token, with the VIGIL_TOKEN env var taking precedence over
    /// the config file.
    pub fn auth_token(&self) -> Option<SecretString> {
        std::env::var("VIGIL_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.auth_token.clone())
            .map(SecretString::from)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs.max(1))
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Full REST endpoint for the post collection.
    pub fn api_endpoint(&self) -> Result<Url, ConfigError> {
        let base = util::parse_http_url(&self.base_url)?;
        Ok(base.join(API_PATH).map_err(UrlError::from)?)
    }

    /// Full push-channel endpoint (ws/wss scheme derived from base_url).
    pub fn ws_endpoint(&self) -> Result<Url, ConfigError> {
        let base = util::parse_http_url(&self.base_url)?;
        Ok(util::websocket_url(&base, WS_PATH)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
