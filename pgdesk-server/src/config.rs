//! Configuration loaded from a TOML file with environment overrides

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pgdesk::ViewerOptions;
use serde::Deserialize;
use thiserror::Error;

/// Path used when `PGDESK_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "pgdesk.toml";

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    /// Failed to parse TOML configuration.
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// Invalid configuration value.
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Listen address and mounting.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix for the API and front-end, `""` mounts at the root
    pub base_path: String,
    /// Built front-end served next to the API
    pub frontend_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4680,
            base_path: String::new(),
            frontend_dir: None,
        }
    }
}

/// Where connections, saved queries and history are written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Memory only when absent
    pub data_dir: Option<PathBuf>,
    pub history_limit: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_limit: 500,
        }
    }
}

/// Pool and result limits applied to every saved connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub query_timeout_secs: u64,
    pub max_result_rows: u64,
    pub default_page_size: u64,
    pub max_page_size: u64,
    pub pattern_sample_size: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout_secs: 5,
            query_timeout_secs: 30,
            max_result_rows: 10_000,
            default_page_size: 100,
            max_page_size: 500,
            pattern_sample_size: 200,
        }
    }
}

/// Metadata cache.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub stale_time_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: 60,
            max_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,tower_http=debug".to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Loads the file named by `PGDESK_CONFIG` (or `pgdesk.toml`) and applies
    /// the `PGDESK_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var("PGDESK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns error if content cannot be parsed or fails validation.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides host, port and data directory from `PGDESK_HOST`,
    /// `PGDESK_PORT` and `PGDESK_DATA_DIR`.
    pub fn apply_overrides<L>(&mut self, lookup: L) -> Result<(), ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("PGDESK_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PGDESK_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("PGDESK_PORT is not a port: {}", port)))?;
        }
        if let Some(data_dir) = lookup("PGDESK_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(data_dir));
        }
        Ok(())
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let database = &self.database;
        if database.default_page_size == 0 || database.max_page_size == 0 {
            return Err(ConfigError::InvalidValue(
                "page sizes must be positive".to_string(),
            ));
        }
        if database.default_page_size > database.max_page_size {
            return Err(ConfigError::InvalidValue(format!(
                "default_page_size {} exceeds max_page_size {}",
                database.default_page_size, database.max_page_size
            )));
        }
        if database.query_timeout_secs == 0 || database.acquire_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "timeouts must be positive".to_string(),
            ));
        }
        if database.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "max_connections must be positive".to_string(),
            ));
        }
        if database.max_result_rows == 0 {
            return Err(ConfigError::InvalidValue(
                "max_result_rows must be positive".to_string(),
            ));
        }
        if self.storage.history_limit == 0 {
            return Err(ConfigError::InvalidValue(
                "history_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to
    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Options handed to the pgdesk router
    pub fn to_viewer_options(&self) -> ViewerOptions {
        ViewerOptions {
            base_path: self.server.base_path.clone(),
            frontend_dir: self.server.frontend_dir.clone(),
            max_connections: self.database.max_connections,
            acquire_timeout: Duration::from_secs(self.database.acquire_timeout_secs),
            query_timeout: Duration::from_secs(self.database.query_timeout_secs),
            max_result_rows: self.database.max_result_rows,
            default_page_size: self.database.default_page_size,
            max_page_size: self.database.max_page_size,
            cache_stale_time: Duration::from_secs(self.cache.stale_time_secs),
            cache_max_entries: self.cache.max_entries,
            pattern_sample_size: self.database.pattern_sample_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[server]
host = "0.0.0.0"
port = 9000
base_path = "/pgdesk"
frontend_dir = "./frontend/dist"

[storage]
history_limit = 50

[database]
query_timeout_secs = 10
max_page_size = 1000

[cache]
stale_time_secs = 5

[logging]
level = "debug"
"#;

        let config = Config::parse(toml_content).expect("should parse");
        assert_eq!(config.listen_address(), "0.0.0.0:9000");
        assert_eq!(config.server.frontend_dir, Some(PathBuf::from("./frontend/dist")));
        assert_eq!(config.storage.history_limit, 50);
        assert_eq!(config.storage.data_dir, None);
        assert_eq!(config.database.max_page_size, 1000);
        assert_eq!(config.database.default_page_size, 100);
        assert_eq!(config.logging.level, "debug");

        let options = config.to_viewer_options();
        assert_eq!(options.base_path, "/pgdesk");
        assert_eq!(options.query_timeout, Duration::from_secs(10));
        assert_eq!(options.cache_stale_time, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").expect("should parse");
        assert_eq!(config.listen_address(), "127.0.0.1:4680");
        assert_eq!(config.logging.level, "info,tower_http=debug");
        assert_eq!(config.storage.data_dir, None);
    }

    #[test]
    fn test_data_dir_enables_file_storage() {
        let config = Config::parse("[storage]\ndata_dir = \"./data\"\n").expect("should parse");
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("./data")));
        assert_eq!(config.storage.history_limit, 500);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load("/nonexistent/pgdesk.toml").expect("defaults");
        assert_eq!(config.server.port, 4680);
    }

    #[test]
    fn test_validation_rejects_page_sizes() {
        let error = Config::parse("[database]\ndefault_page_size = 600\nmax_page_size = 500\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));

        let error = Config::parse("[database]\nmax_page_size = 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));

        let error = Config::parse("[database]\nquery_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let environment: HashMap<&str, &str> = [
            ("PGDESK_HOST", "0.0.0.0"),
            ("PGDESK_PORT", "8123"),
            ("PGDESK_DATA_DIR", "/var/lib/pgdesk"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| environment.get(key).map(|value| value.to_string()))
            .unwrap();
        assert_eq!(config.listen_address(), "0.0.0.0:8123");
        assert_eq!(config.storage.data_dir, Some(PathBuf::from("/var/lib/pgdesk")));

        let mut config = Config::default();
        let error = config
            .apply_overrides(|key| (key == "PGDESK_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(_)));
    }
}
