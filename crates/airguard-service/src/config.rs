//! Server configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use airguard_types::Role;
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Device gateway settings.
    pub gateway: GatewayConfig,
    /// Observer broadcast settings.
    pub broadcast: BroadcastConfig,
    /// Background aggregation settings.
    pub aggregation: AggregationConfig,
    /// Bearer tokens accepted by the API.
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every error found.
    ///
    /// # Example
    ///
    /// ```
    /// use airguard_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.gateway.validate());
        errors.extend(self.broadcast.validate());
        errors.extend(self.aggregation.validate());
        errors.extend(self.auth.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError::new(
                "server.bind",
                "bind address cannot be empty",
            ));
            return errors;
        }

        match self.bind.rsplit_once(':') {
            None => errors.push(ValidationError::new(
                "server.bind",
                format!(
                    "invalid bind address '{}': expected format 'host:port'",
                    self.bind
                ),
            )),
            Some((_, port)) => match port.parse::<u16>() {
                Ok(0) => errors.push(ValidationError::new("server.bind", "port cannot be 0")),
                Err(_) => errors.push(ValidationError::new(
                    "server.bind",
                    format!("invalid port '{}': must be a number 1-65535", port),
                )),
                Ok(_) => {}
            },
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airguard_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Device gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// WebSocket path the device connects to.
    pub path: String,
    /// Upper bound on a single send to the device, in milliseconds.
    pub send_timeout_ms: u64,
    /// Outbound frames buffered for the device session.
    pub queue_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            path: "/esp32".to_string(),
            send_timeout_ms: 5_000,
            queue_size: 32,
        }
    }
}

impl GatewayConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Validate gateway configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !self.path.starts_with('/') || self.path.len() < 2 {
            errors.push(ValidationError::new(
                "gateway.path",
                format!("path '{}' must start with '/' and name a route", self.path),
            ));
        } else if self.path == "/api" || self.path.starts_with("/api/") {
            errors.push(ValidationError::new(
                "gateway.path",
                format!("path '{}' collides with the /api routes", self.path),
            ));
        }
        if self.send_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "gateway.send_timeout_ms",
                "send timeout must be greater than 0",
            ));
        }
        if self.queue_size == 0 {
            errors.push(ValidationError::new(
                "gateway.queue_size",
                "queue size must be greater than 0",
            ));
        }

        errors
    }
}

/// Observer broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Upper bound on delivering one event to one observer, in milliseconds.
    pub delivery_timeout_ms: u64,
    /// Events buffered per observer, both in its bus queue and its socket channel.
    pub observer_buffer: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: 2_000,
            observer_buffer: 64,
        }
    }
}

impl BroadcastConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Validate broadcast configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.delivery_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "broadcast.delivery_timeout_ms",
                "delivery timeout must be greater than 0",
            ));
        }
        if self.observer_buffer == 0 {
            errors.push(ValidationError::new(
                "broadcast.observer_buffer",
                "observer buffer must be greater than 0",
            ));
        }

        errors
    }
}

/// Minimum aggregation interval in seconds.
pub const MIN_AGGREGATION_INTERVAL: u64 = 10;

/// Maximum aggregation interval in seconds (30 days).
pub const MAX_AGGREGATION_INTERVAL: u64 = 30 * 24 * 60 * 60;

/// Background aggregation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// Run the hourly and daily loops.
    pub enabled: bool,
    /// Seconds between hourly rollups.
    pub hourly_interval_secs: u64,
    /// Seconds between daily rollups.
    pub daily_interval_secs: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hourly_interval_secs: 60 * 60,
            daily_interval_secs: 24 * 60 * 60,
        }
    }
}

impl AggregationConfig {
    /// Validate aggregation configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("aggregation.hourly_interval_secs", self.hourly_interval_secs),
            ("aggregation.daily_interval_secs", self.daily_interval_secs),
        ] {
            if value < MIN_AGGREGATION_INTERVAL {
                errors.push(ValidationError::new(
                    field,
                    format!(
                        "interval {} is too short (minimum {} seconds)",
                        value, MIN_AGGREGATION_INTERVAL
                    ),
                ));
            } else if value > MAX_AGGREGATION_INTERVAL {
                errors.push(ValidationError::new(
                    field,
                    format!(
                        "interval {} is too long (maximum {} seconds)",
                        value, MAX_AGGREGATION_INTERVAL
                    ),
                ));
            }
        }

        errors
    }
}

/// Minimum bearer token length.
pub const MIN_TOKEN_LENGTH: usize = 16;

/// Bearer token table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

impl AuthConfig {
    /// Validate the token table.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for (i, entry) in self.tokens.iter().enumerate() {
            let prefix = format!("auth.tokens[{}]", i);

            if entry.token.len() < MIN_TOKEN_LENGTH {
                errors.push(ValidationError::new(
                    format!("{}.token", prefix),
                    format!("token is too short (minimum {} characters)", MIN_TOKEN_LENGTH),
                ));
            }
            if !seen.insert(entry.token.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.token", prefix),
                    "duplicate token",
                ));
            }
            if entry.account.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("{}.account", prefix),
                    "account cannot be empty",
                ));
            }
        }

        errors
    }
}

/// One accepted bearer token and the principal it authenticates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub account: String,
    #[serde(default)]
    pub role: Role,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `auth.tokens[0].token`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airguard")
        .join("server.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(token: &str, account: &str, role: Role) -> TokenConfig {
        TokenConfig {
            token: token.to_string(),
            account: account.to_string(),
            role,
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(config.storage.path, airguard_store::default_db_path());
        assert_eq!(config.gateway.path, "/esp32");
        assert!(config.aggregation.enabled);
        assert_eq!(config.aggregation.hourly_interval_secs, 3600);
        assert_eq!(config.aggregation.daily_interval_secs, 86400);
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_timeouts_as_durations() {
        let config = Config::default();
        assert_eq!(config.gateway.send_timeout(), Duration::from_secs(5));
        assert_eq!(config.broadcast.delivery_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_full_toml() {
        let toml = r#"
            [server]
            bind = "0.0.0.0:3000"

            [storage]
            path = "/data/airguard.db"

            [gateway]
            path = "/device"
            send_timeout_ms = 1500

            [aggregation]
            enabled = false

            [[auth.tokens]]
            token = "alice-token-0123456789"
            account = "alice"

            [[auth.tokens]]
            token = "admin-token-0123456789"
            account = "root"
            role = "admin"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert_eq!(config.storage.path, PathBuf::from("/data/airguard.db"));
        assert_eq!(config.gateway.path, "/device");
        assert_eq!(config.gateway.send_timeout_ms, 1500);
        assert_eq!(config.gateway.queue_size, 32);
        assert!(!config.aggregation.enabled);
        assert_eq!(config.auth.tokens.len(), 2);
        assert_eq!(config.auth.tokens[0].role, Role::User);
        assert_eq!(config.auth.tokens[1].role, Role::Admin);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("server.toml");

        let mut config = Config::default();
        config.server.bind = "0.0.0.0:9090".to_string();
        config.storage.path = PathBuf::from("/tmp/test.db");
        config.broadcast.observer_buffer = 8;
        config
            .auth
            .tokens
            .push(token("saved-token-0123456789", "alice", Role::Admin));

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();

        assert_eq!(loaded.server.bind, "0.0.0.0:9090");
        assert_eq!(loaded.storage.path, PathBuf::from("/tmp/test.db"));
        assert_eq!(loaded.broadcast.observer_buffer, 8);
        assert_eq!(loaded.auth.tokens[0].account, "alice");
        assert_eq!(loaded.auth.tokens[0].role, Role::Admin);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("invalid.toml");
        std::fs::write(&config_path, "this is not valid { toml").unwrap();

        let result = Config::load(&config_path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("airguard/server.toml"));
    }

    // ==========================================================================
    // Validation tests
    // ==========================================================================

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_server_bind_validation() {
        let bind = |s: &str| ServerConfig {
            bind: s.to_string(),
        };

        assert!(bind("127.0.0.1:8080").validate().is_empty());
        assert!(bind("[::1]:8080").validate().is_empty());
        assert!(bind("localhost:8080").validate().is_empty());

        let errors = bind("").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));

        let errors = bind("127.0.0.1").validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("host:port"));

        let errors = bind("127.0.0.1:0").validate();
        assert!(errors[0].message.contains("cannot be 0"));

        let errors = bind("127.0.0.1:abc").validate();
        assert!(errors[0].message.contains("must be a number"));
    }

    #[test]
    fn test_storage_path_validation() {
        let empty = StorageConfig {
            path: PathBuf::new(),
        };
        let errors = empty.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("cannot be empty"));
    }

    #[test]
    fn test_gateway_validation() {
        let mut gateway = GatewayConfig::default();
        assert!(gateway.validate().is_empty());

        gateway.path = "esp32".to_string();
        assert_eq!(gateway.validate()[0].field, "gateway.path");

        gateway.path = "/api/esp32".to_string();
        assert!(gateway.validate()[0].message.contains("collides"));

        let zeroed = GatewayConfig {
            send_timeout_ms: 0,
            queue_size: 0,
            ..Default::default()
        };
        assert_eq!(zeroed.validate().len(), 2);
    }

    #[test]
    fn test_aggregation_interval_validation() {
        let config = AggregationConfig {
            enabled: true,
            hourly_interval_secs: 5,
            daily_interval_secs: 86400,
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "aggregation.hourly_interval_secs");
        assert!(errors[0].message.contains("too short"));
    }

    #[test]
    fn test_aggregation_interval_upper_bound() {
        let config = AggregationConfig {
            enabled: true,
            hourly_interval_secs: MAX_AGGREGATION_INTERVAL,
            daily_interval_secs: u64::MAX,
        };
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "aggregation.daily_interval_secs");
        assert!(errors[0].message.contains("too long"));

        let mut full = Config::default();
        full.aggregation.hourly_interval_secs = u64::MAX;
        assert!(matches!(full.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_auth_token_validation() {
        let auth = AuthConfig {
            tokens: vec![
                token("short", "alice", Role::User),
                token("duplicate-token-0123", "bob", Role::User),
                token("duplicate-token-0123", " ", Role::Admin),
            ],
        };

        let errors = auth.validate();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.message.contains("too short")));
        assert!(errors.iter().any(|e| e.message.contains("duplicate")));
        assert!(errors.iter().any(|e| e.field == "auth.tokens[2].account"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let mut config = Config::default();
        config.server.bind = "127.0.0.1:0".to_string();
        config.broadcast.observer_buffer = 0;

        let display = config.validate().unwrap_err().to_string();
        assert!(display.contains("server.bind"));
        assert!(display.contains("broadcast.observer_buffer"));
    }
}
