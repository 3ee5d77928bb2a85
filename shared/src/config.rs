//! # Configuration for the Mise Device Directory
//!
//! This module handles configuration loading and validation for the
//! config service and the device client. Everything has a default;
//! environment variables override the defaults.

use crate::constants::*;
use crate::error::{DirectoryError, DirectoryResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

fn env_parse<T: std::str::FromStr>(name: &str) -> DirectoryResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| DirectoryError::ConfigurationError(format!("{name} has invalid value '{raw}'"))),
        Err(_) => Ok(None),
    }
}

// =============================================================================
// CONFIG SERVICE CONFIGURATION
// =============================================================================

/// Configuration for the config service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API server configuration
    pub api: ApiConfig,

    /// Bearer token authentication
    pub auth: AuthConfig,

    /// Document store configuration
    pub store: StoreConfig,

    /// Transaction retry policy at the HTTP boundary
    pub transaction: TransactionConfig,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            store: StoreConfig::default(),
            transaction: TransactionConfig::default(),
            log_level: "info".into(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DirectoryResult<Self> {
        let mut config = Self::default();

        if let Ok(host) = env::var(ENV_HOST) {
            config.api.host = host;
        }

        // Explicit port wins over the platform-provided one
        if let Some(port) = env_parse::<u16>(ENV_PORT)? {
            config.api.port = port;
        } else if let Some(port) = env_parse::<u16>(ENV_PLATFORM_PORT)? {
            config.api.port = port;
        }

        if let Ok(token) = env::var(ENV_AUTH_TOKEN) {
            config.auth.token = Some(token);
        }

        if let Ok(path) = env::var(ENV_DATA_PATH) {
            config.store.data_path = Some(PathBuf::from(path));
        }

        if let Some(attempts) = env_parse::<u32>(ENV_TRANSACTION_ATTEMPTS)? {
            config.transaction.max_attempts = attempts;
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> DirectoryResult<()> {
        self.transaction.validate()?;

        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(DirectoryError::ConfigurationError(format!(
                "unknown log level '{}'",
                self.log_level
            )));
        }

        Ok(())
    }
}

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// API server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Enable CORS
    pub enable_cors: bool,

    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: CONFIG_SERVICE_PORT,
            enable_cors: true,
            max_body_size: MAX_REQUEST_BODY_SIZE,
        }
    }
}

impl ApiConfig {
    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// =============================================================================
// AUTH CONFIGURATION
// =============================================================================

/// Bearer token authentication
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected bearer token; requests are refused while unset
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl AuthConfig {
    /// Config with a fixed token
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }
}

// =============================================================================
// STORE CONFIGURATION
// =============================================================================

/// Document store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// File the in-memory store is persisted to after every commit
    /// (memory only when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_path: Option<PathBuf>,
}

// =============================================================================
// TRANSACTION CONFIGURATION
// =============================================================================

/// Retry policy applied by the HTTP boundary to conflicted transactions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,

    /// Delay before each retry, multiplied by the attempt number
    pub backoff_ms: u64,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
            backoff_ms: DEFAULT_TRANSACTION_BACKOFF_MS,
        }
    }
}

impl TransactionConfig {
    /// Validate the retry policy
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.max_attempts == 0 {
            return Err(DirectoryError::ConfigurationError(
                "transaction max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// DEVICE CLIENT CONFIGURATION
// =============================================================================

/// Configuration for the Device Client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceClientConfig {
    /// Config service URL
    pub service_url: String,

    /// Bearer token sent with every request
    #[serde(skip_serializing)]
    pub auth_token: Option<String>,

    /// Local storage configuration
    pub storage: StorageConfig,

    /// Cache configuration
    pub cache: CacheConfig,
}

impl Default for DeviceClientConfig {
    fn default() -> Self {
        Self {
            service_url: format!("http://localhost:{}", CONFIG_SERVICE_PORT),
            auth_token: None,
            storage: StorageConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl DeviceClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> DirectoryResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var(ENV_SERVICE_URL) {
            config.service_url = url;
        }

        if let Ok(token) = env::var(ENV_AUTH_TOKEN) {
            config.auth_token = Some(token);
        }

        if let Ok(path) = env::var(ENV_DEVICE_STORAGE_PATH) {
            config.storage.data_path = PathBuf::from(path);
        }

        Ok(config)
    }

    /// Get the auth token, which every request needs
    pub fn token(&self) -> DirectoryResult<&str> {
        self.auth_token
            .as_deref()
            .ok_or_else(|| DirectoryError::MissingEnvVar(ENV_AUTH_TOKEN.into()))
    }
}

// =============================================================================
// STORAGE CONFIGURATION
// =============================================================================

/// Device-side storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for device data
    pub data_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DEVICE_STORAGE_PATH),
        }
    }
}

// =============================================================================
// CACHE CONFIGURATION
// =============================================================================

/// Client-side configuration cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable caching
    pub enabled: bool,

    /// Configuration cache TTL in seconds
    pub configuration_ttl_secs: u64,

    /// Maximum number of cached configurations
    pub max_configurations: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            configuration_ttl_secs: CACHE_TTL_CONFIGURATION_SECS,
            max_configurations: CACHE_MAX_CONFIGURATIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.transaction.max_attempts, DEFAULT_TRANSACTION_ATTEMPTS);
        assert!(config.auth.token.is_none());
        assert!(config.store.data_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_api_bind_addr() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = ServiceConfig::default();
        config.transaction.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(DirectoryError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = ServiceConfig::default();
        config.log_level = "chatty".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_token_is_never_serialized() {
        let config = ServiceConfig {
            auth: AuthConfig::with_token("secret"),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_client_token_required() {
        let config = DeviceClientConfig::default();
        assert_eq!(
            config.token(),
            Err(DirectoryError::MissingEnvVar(ENV_AUTH_TOKEN.into()))
        );
    }
}
