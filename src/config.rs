// Configuration File Support
//
// This module provides configuration file parsing for the try-on engine.
// Supports TOML format with environment variable overrides.
// Configuration files are loaded from the XDG config directory:
// ~/.config/tryon/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::quota::QuotaConfig;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Quota enforcement configuration
    pub quota: QuotaConfig,

    /// Generation vendor configuration
    pub vendor: VendorConfig,

    /// Permanent storage configuration
    pub storage: StorageConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,

    /// Device fingerprint configuration
    pub fingerprint: FingerprintConfig,

    /// Authenticated caller configuration
    pub auth: AuthConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Generation vendor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VendorConfig {
    /// API root, e.g. `https://api.vendor.example`
    pub base_url: String,

    /// Bearer token for the vendor API
    pub api_key: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Delay between task polls in seconds
    pub poll_interval_secs: u64,

    /// Maximum polls before a task counts as timed out
    pub poll_max_attempts: u32,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.vendor.example".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            poll_interval_secs: 3,
            poll_max_attempts: 40,
        }
    }
}

/// Permanent storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Upload gateway root; empty selects the local directory backend
    pub gateway_url: String,

    /// Public base URL uploaded keys are served from
    pub public_base: String,

    /// Bearer token for the gateway
    pub api_key: String,

    /// Directory for the local backend
    pub local_dir: String,

    /// Sweep attempts before a queued upload is dropped
    pub sweep_max_attempts: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            gateway_url: String::new(),
            public_base: String::new(),
            api_key: String::new(),
            local_dir: "./results".to_string(),
            sweep_max_attempts: 5,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether to enable the metrics endpoint
    pub enabled: bool,

    /// Port for the metrics server
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9090,
        }
    }
}

/// Device fingerprint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FingerprintConfig {
    /// Server-side secret keying the fingerprint digest
    pub secret: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            secret: "dev-only-secret".to_string(),
        }
    }
}

/// Authenticated caller configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer tokens pre-registered with the static verifier
    pub tokens: Vec<AuthTokenEntry>,
}

/// One pre-registered bearer token
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AuthTokenEntry {
    /// Bearer token value
    pub token: String,

    /// Stable user id the token resolves to
    pub user_id: String,

    /// Whether the user holds a lifetime premium plan
    pub premium: bool,
}

impl Config {
    /// Load configuration from the default XDG config directory.
    ///
    /// If the config file does not exist, returns default configuration.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path.
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    /// If the config file does not exist, returns default configuration.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default().apply_env_overrides());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file from {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file from {:?}", path))?;

        // Apply environment variable overrides
        let config = config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Get the default configuration file path
    ///
    /// Returns `~/.config/tryon/config.toml` on Linux/Mac
    pub fn config_path() -> PathBuf {
        if let Some(proj_dirs) = directories::ProjectDirs::from("com", "tryon", "TryOn") {
            proj_dirs.config_dir().join("config.toml")
        } else {
            // Fallback if XDG dirs cannot be determined
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home)
                .join(".config")
                .join("tryon")
                .join("config.toml")
        }
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Environment variables take precedence over config file values:
    /// - TRYON_LOG_LEVEL / TRYON_LOG_FORMAT
    /// - TRYON_VENDOR_URL / TRYON_VENDOR_API_KEY
    /// - TRYON_STORAGE_GATEWAY / TRYON_STORAGE_API_KEY
    /// - TRYON_METRICS_ENABLED / TRYON_METRICS_PORT
    /// - TRYON_FINGERPRINT_SECRET
    /// - the TRYON_QUOTA_* family (see [`QuotaConfig::from_env`])
    fn apply_env_overrides(mut self) -> Self {
        // Logging overrides
        if let Ok(level) = std::env::var("TRYON_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TRYON_LOG_FORMAT") {
            self.logging.format = format;
        }

        // Vendor overrides
        if let Ok(url) = std::env::var("TRYON_VENDOR_URL") {
            self.vendor.base_url = url;
        }
        if let Ok(key) = std::env::var("TRYON_VENDOR_API_KEY") {
            self.vendor.api_key = key;
        }
        if let Ok(interval) = std::env::var("TRYON_POLL_INTERVAL_SECS") {
            if let Ok(interval) = interval.parse::<u64>() {
                if interval > 0 {
                    self.vendor.poll_interval_secs = interval;
                }
            }
        }
        if let Ok(attempts) = std::env::var("TRYON_POLL_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse::<u32>() {
                if attempts > 0 {
                    self.vendor.poll_max_attempts = attempts;
                }
            }
        }

        // Storage overrides
        if let Ok(url) = std::env::var("TRYON_STORAGE_GATEWAY") {
            self.storage.gateway_url = url;
        }
        if let Ok(key) = std::env::var("TRYON_STORAGE_API_KEY") {
            self.storage.api_key = key;
        }

        // Metrics overrides
        if let Ok(enabled) = std::env::var("TRYON_METRICS_ENABLED") {
            self.metrics.enabled = enabled.parse().unwrap_or(self.metrics.enabled);
        }
        if let Ok(port) = std::env::var("TRYON_METRICS_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.metrics.port = port;
            }
        }

        // Fingerprint override
        if let Ok(secret) = std::env::var("TRYON_FINGERPRINT_SECRET") {
            self.fingerprint.secret = secret;
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        // Validate logging level
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        // Validate logging format
        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        // Validate vendor configuration
        if self.vendor.base_url.is_empty() {
            anyhow::bail!("Vendor base URL must not be empty");
        }
        if self.vendor.poll_interval_secs == 0 {
            anyhow::bail!("Vendor poll interval must be > 0 seconds");
        }
        if self.vendor.poll_max_attempts == 0 {
            anyhow::bail!("Vendor poll attempt budget must be > 0");
        }

        // Validate storage configuration
        if !self.storage.gateway_url.is_empty() && self.storage.public_base.is_empty() {
            anyhow::bail!("Storage gateway is configured but public_base is empty");
        }
        if self.storage.sweep_max_attempts == 0 {
            anyhow::bail!("Sweep attempt budget must be > 0");
        }

        // Validate quota configuration
        if self.quota.enabled && self.quota.anonymous_daily_limit == 0 {
            anyhow::bail!("Anonymous daily limit must be > 0 while enforcement is enabled");
        }
        if self.quota.retention_days <= 0 {
            anyhow::bail!("Ledger retention must be > 0 days");
        }

        // Validate metrics configuration
        if self.metrics.port == 0 {
            anyhow::bail!("Metrics port must be > 0");
        }

        // Validate auth configuration
        for entry in &self.auth.tokens {
            if entry.token.is_empty() || entry.user_id.is_empty() {
                anyhow::bail!("Auth token entries need both a token and a user_id");
            }
        }

        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging
            .level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
