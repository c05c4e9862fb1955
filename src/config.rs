//! Configuration loading for bifrostd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.bifrost/config.toml` (user)
//! 3. `/etc/bifrost/config.toml` (system)
//!
//! The API secret is loaded separately with mandatory permission checks:
//! 1. `~/.bifrost/secrets.toml` (user, must be 0600)
//! 2. `/etc/bifrost/secrets.toml` (system, must be 0600)
//! 3. `BIFROST_API_SECRET` environment variable

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::resolver::{ApiConfig, RetrieverConfig};
use crate::{BifrostError, Result};

/// Environment variable consulted when no secrets file provides the API secret.
pub const API_SECRET_ENV_VAR: &str = "BIFROST_API_SECRET";

/// Daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiSection,
    #[serde(default)]
    pub cache: CacheSection,
}

/// Control-plane API connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSection {
    pub base_url: String,
    /// Per-request timeout in seconds (default: 10).
    #[serde(default = "default_client_timeout")]
    pub client_timeout_secs: u64,
    /// API token lifetime in seconds (default: 30).
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,
    /// Extra status polls at startup (default: 10).
    #[serde(default = "default_poll_retries")]
    pub status_poll_retries: u32,
    /// Pause between status polls in seconds (default: 10).
    #[serde(default = "default_poll_interval")]
    pub status_poll_interval_secs: u64,
}

fn default_client_timeout() -> u64 {
    10
}

fn default_jwt_expiry() -> u64 {
    30
}

fn default_poll_retries() -> u32 {
    crate::resolver::DEFAULT_POLLING_MAX_RETRIES
}

fn default_poll_interval() -> u64 {
    crate::resolver::DEFAULT_POLLING_INTERVAL.as_secs()
}

/// Domain cache tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Entry refresh timeout in seconds (default: 60).
    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,
    /// Entry expiration timeout in seconds (default: 600).
    #[serde(default = "default_expiry")]
    pub expiry_secs: u64,
    /// Idle eviction of entries in seconds (default: 3600).
    #[serde(default = "default_housekeeping")]
    pub housekeeping_secs: u64,
    /// Maximum number of cached hostnames (default: 100000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    /// Retrieval deadline in seconds (default: 30).
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_secs: u64,
    /// Pause between failed attempts in milliseconds (default: 1000).
    #[serde(default = "default_retrieval_interval")]
    pub retrieval_interval_ms: u64,
    /// Attempts per retrieval (default: 3).
    #[serde(default = "default_retrieval_retries")]
    pub retrieval_retries: u32,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            refresh_secs: default_refresh(),
            expiry_secs: default_expiry(),
            housekeeping_secs: default_housekeeping(),
            max_entries: default_max_entries(),
            retrieval_timeout_secs: default_retrieval_timeout(),
            retrieval_interval_ms: default_retrieval_interval(),
            retrieval_retries: default_retrieval_retries(),
        }
    }
}

fn default_refresh() -> u64 {
    60
}

fn default_expiry() -> u64 {
    600
}

fn default_housekeeping() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    100_000
}

fn default_retrieval_timeout() -> u64 {
    30
}

fn default_retrieval_interval() -> u64 {
    1000
}

fn default_retrieval_retries() -> u32 {
    3
}

/// Secrets file contents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub api_secret: Option<String>,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.bifrost/config.toml`
    /// 3. `/etc/bifrost/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from_file(&path)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            BifrostError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(BifrostError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bifrost").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/bifrost/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(BifrostError::Configuration(
            "No config file found. Create ~/.bifrost/config.toml or /etc/bifrost/config.toml"
                .to_string(),
        ))
    }

    /// Reject settings the cache cannot work with.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.refresh_secs == 0 || cache.expiry_secs == 0 {
            return Err(BifrostError::Configuration(
                "cache refresh_secs and expiry_secs must be positive".to_string(),
            ));
        }
        if cache.refresh_secs > cache.expiry_secs {
            return Err(BifrostError::Configuration(format!(
                "cache refresh_secs ({}) must not exceed expiry_secs ({})",
                cache.refresh_secs, cache.expiry_secs
            )));
        }
        if cache.retrieval_timeout_secs == 0 {
            return Err(BifrostError::Configuration(
                "cache retrieval_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Library cache configuration for the `[cache]` section.
    pub fn cache_config(&self) -> CacheConfig {
        let cache = &self.cache;
        CacheConfig::new()
            .refresh_timeout(Duration::from_secs(cache.refresh_secs))
            .expiration_timeout(Duration::from_secs(cache.expiry_secs))
            .housekeeping_ttl(Duration::from_secs(cache.housekeeping_secs))
            .max_entries(cache.max_entries)
            .retriever(
                RetrieverConfig::new()
                    .timeout(Duration::from_secs(cache.retrieval_timeout_secs))
                    .interval(Duration::from_millis(cache.retrieval_interval_ms))
                    .max_retries(cache.retrieval_retries),
            )
    }

    /// API client configuration for the `[api]` section, signed with `secret`.
    pub fn api_config(&self, secret: impl Into<Vec<u8>>) -> ApiConfig {
        ApiConfig::new(&self.api.base_url, secret)
            .client_timeout(Duration::from_secs(self.api.client_timeout_secs))
            .jwt_expiry(Duration::from_secs(self.api.jwt_expiry_secs))
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.api.status_poll_interval_secs)
    }
}

impl Secrets {
    /// Load secrets from the standard locations with permission checks.
    ///
    /// Resolution order:
    /// 1. `~/.bifrost/secrets.toml` (if exists, must be 0600)
    /// 2. `/etc/bifrost/secrets.toml` (if exists, must be 0600)
    ///
    /// Returns empty secrets if no file exists.
    pub fn load() -> Result<Self> {
        if let Some(home) = dirs::home_dir() {
            let user_secrets = home.join(".bifrost").join("secrets.toml");
            if user_secrets.exists() {
                return Self::load_from_file(&user_secrets);
            }
        }

        let system_secrets = PathBuf::from("/etc/bifrost/secrets.toml");
        if system_secrets.exists() {
            return Self::load_from_file(&system_secrets);
        }

        Ok(Secrets::default())
    }

    /// Load a secrets file after checking its permissions.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Self::check_permissions(path)?;
        let content = fs::read_to_string(path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            BifrostError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
        })
    }

    /// Check that the secrets file has secure permissions (0600 or 0400).
    #[cfg(unix)]
    fn check_permissions(path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = fs::metadata(path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
        })?;

        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            return Err(BifrostError::Configuration(format!(
                "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                mode & 0o777
            )));
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_permissions(_path: &Path) -> Result<()> {
        Ok(())
    }

    /// The API secret, falling back to [`API_SECRET_ENV_VAR`].
    pub fn api_secret(&self) -> Result<String> {
        self.api_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| std::env::var(API_SECRET_ENV_VAR).ok().filter(|s| !s.is_empty()))
            .ok_or_else(|| {
                BifrostError::Configuration(format!(
                    "No API secret found. Set api_secret in secrets.toml or {API_SECRET_ENV_VAR}"
                ))
            })
    }
}
