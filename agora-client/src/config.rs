//! Configuration loading for the `agora` binary.
//!
//! All fields are required. No defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use agora_core::{BearerToken, ConfigError};
use agora_storage::CacheConfig;
use serde::Deserialize;

use crate::session::SessionContext;
use crate::settings::EngineSettings;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgoraConfig {
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub deployment_id: String,
    pub auth: AuthConfig,
    pub cache: CacheSection,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    pub user_id: String,
    pub bearer_token: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    pub store_path: PathBuf,
    pub store_max_size_mb: usize,
    pub graph_discovery_ttl_secs: u64,
    pub assistant_list_ttl_secs: u64,
    pub assistant_layer_enabled: bool,
    pub max_entry_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub version_poll_interval_secs: u64,
    pub reconcile_delay_ms: u64,
    pub optimistic_retention_secs: u64,
    pub notification_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub filter: String,
    pub json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("Missing configuration file path (use --config or AGORA_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

impl AgoraConfig {
    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigLoadError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    /// Read, parse and validate one file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigLoadError> {
        let config: AgoraConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(invalid("api_base_url", "must not be empty"));
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            return Err(invalid("api_base_url", "must start with http:// or https://"));
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be > 0"));
        }
        if self.deployment_id.trim().is_empty() {
            return Err(invalid("deployment_id", "must not be empty"));
        }
        if self.auth.user_id.trim().is_empty() {
            return Err(invalid("auth.user_id", "must not be empty"));
        }
        if self.auth.bearer_token.trim().is_empty() {
            return Err(invalid("auth.bearer_token", "must not be empty"));
        }
        if self.cache.store_path.as_os_str().is_empty() {
            return Err(invalid("cache.store_path", "must not be empty"));
        }
        if self.cache.store_max_size_mb == 0 {
            return Err(invalid("cache.store_max_size_mb", "must be > 0"));
        }
        if self.cache.graph_discovery_ttl_secs == 0 {
            return Err(invalid("cache.graph_discovery_ttl_secs", "must be > 0"));
        }
        if self.cache.assistant_list_ttl_secs == 0 {
            return Err(invalid("cache.assistant_list_ttl_secs", "must be > 0"));
        }
        if self.cache.max_entry_bytes == 0 {
            return Err(invalid("cache.max_entry_bytes", "must be > 0"));
        }
        if self.cache.max_entry_bytes > self.cache.store_max_size_mb * 1024 * 1024 {
            return Err(invalid(
                "cache.max_entry_bytes",
                "must not exceed store_max_size_mb",
            ));
        }
        if self.sync.version_poll_interval_secs == 0 {
            return Err(invalid("sync.version_poll_interval_secs", "must be > 0"));
        }
        if self.sync.optimistic_retention_secs * 1000 < self.sync.reconcile_delay_ms {
            return Err(invalid(
                "sync.optimistic_retention_secs",
                "must cover reconcile_delay_ms",
            ));
        }
        if self.sync.notification_ttl_secs == 0 {
            return Err(invalid("sync.notification_ttl_secs", "must be > 0"));
        }
        if self.logging.filter.trim().is_empty() {
            return Err(invalid("logging.filter", "must not be empty"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        let cache = CacheConfig::new()
            .with_graph_discovery_ttl(Duration::from_secs(self.cache.graph_discovery_ttl_secs))
            .with_assistant_list_ttl(Duration::from_secs(self.cache.assistant_list_ttl_secs))
            .with_assistant_layer(self.cache.assistant_layer_enabled)
            .with_max_entry_bytes(self.cache.max_entry_bytes);
        EngineSettings::new()
            .with_poll_interval(Duration::from_secs(self.sync.version_poll_interval_secs))
            .with_reconcile_delay(Duration::from_millis(self.sync.reconcile_delay_ms))
            .with_optimistic_retention(Duration::from_secs(self.sync.optimistic_retention_secs))
            .with_notification_ttl(Duration::from_secs(self.sync.notification_ttl_secs))
            .with_cache(cache)
    }

    pub fn session(&self) -> SessionContext {
        SessionContext::new(
            self.auth.user_id.as_str(),
            BearerToken::new(self.auth.bearer_token.clone()),
            self.deployment_id.as_str(),
        )
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("AGORA_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
