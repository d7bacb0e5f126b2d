//! Configuration file parser for ~/.config/clusterview/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as likely typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::cluster::{ResourceKind, WatchConfig};
use crate::tree::{TreeConfig, DEFAULT_PAGE_SIZE};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds the maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// `token` is masked in Debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// API server address. Plain http only for loopback (e.g. `kubectl proxy`).
    pub server: String,

    /// Bearer token. `CLUSTERVIEW_TOKEN` takes precedence.
    pub token: Option<String>,

    /// Children shown per page when progressive loading is on.
    pub page_size: usize,

    pub progressive_loading: bool,

    /// Quiet period before a burst of refreshes redraws the tree.
    pub debounce_ms: u64,

    pub max_reconnect_attempts: u32,

    pub reconnect_base_delay_ms: u64,

    pub request_timeout_secs: u64,

    /// Resource kinds shown as top-level categories and watched for changes.
    pub watch_kinds: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8001".to_string(),
            token: None,
            page_size: DEFAULT_PAGE_SIZE,
            progressive_loading: true,
            debounce_ms: 300,
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 1000,
            request_timeout_secs: 30,
            watch_kinds: vec![
                "pods".to_string(),
                "deployments".to_string(),
                "services".to_string(),
            ],
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("page_size", &self.page_size)
            .field("progressive_loading", &self.progressive_loading)
            .field("debounce_ms", &self.debounce_ms)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_base_delay_ms", &self.reconnect_base_delay_ms)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("watch_kinds", &self.watch_kinds)
            .finish()
    }
}

const KNOWN_KEYS: &[&str] = &[
    "server",
    "token",
    "page_size",
    "progressive_loading",
    "debounce_ms",
    "max_reconnect_attempts",
    "reconnect_base_delay_ms",
    "request_timeout_secs",
    "watch_kinds",
];

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
                // Deleted between metadata and read
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
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(&content)?;
        config.sanitize();
        tracing::info!(path = %path.display(), server = %config.server, "Loaded configuration");
        Ok(config)
    }

    /// Replace values the engine cannot work with by their defaults.
    pub fn sanitize(&mut self) {
        if self.page_size == 0 {
            tracing::warn!("page_size must be at least 1, using {}", DEFAULT_PAGE_SIZE);
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        if self.request_timeout_secs == 0 {
            tracing::warn!("request_timeout_secs must be at least 1, using 30");
            self.request_timeout_secs = 30;
        }
    }

    pub fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            page_size: self.page_size,
            progressive_loading: self.progressive_loading,
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            max_attempts: self.max_reconnect_attempts,
            base_delay: Duration::from_millis(self.reconnect_base_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Configured kinds that the browser knows about, in order, without duplicates.
    pub fn kinds(&self) -> Vec<&'static ResourceKind> {
        let mut kinds: Vec<&'static ResourceKind> = Vec::new();
        for name in &self.watch_kinds {
            match ResourceKind::lookup(name) {
                Some(kind) if !kinds.contains(&kind) => kinds.push(kind),
                Some(_) => {}
                None => tracing::warn!(kind = %name, "Unknown resource kind in watch_kinds, ignoring"),
            }
        }
        kinds
    }
}

// ============================================================================
// Tests
// ============================================================================
