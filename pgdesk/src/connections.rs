//! Saved connections and the providers opened for them

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::database::{DatabaseError, DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::store::{JsonStore, Record, StoreError};

/// TLS negotiation for a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

/// Full connection configuration (stored internally)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for ConnectionConfig {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Connection as returned by the API (never carries the password)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionItem {
    pub id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub has_password: bool,
    pub ssl_mode: SslMode,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConnectionConfig> for ConnectionItem {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            username: config.username.clone(),
            has_password: !config.password.is_empty(),
            ssl_mode: config.ssl_mode,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

fn default_port() -> u16 {
    5432
}

/// Create/update/test body for a connection
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "host is required"))]
    pub host: String,

    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "port must be between 1 and 65535"))]
    pub port: u16,

    #[validate(length(min = 1, message = "database is required"))]
    pub database: String,

    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,

    /// On update, `None` keeps the stored password
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ConnectionRequest {
    fn into_config(self, id: String, now: DateTime<Utc>) -> ConnectionConfig {
        ConnectionConfig {
            id,
            name: self.name,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password: self.password.unwrap_or_default(),
            ssl_mode: self.ssl_mode,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of a connection test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub success: bool,
    pub server_version: Option<String>,
    pub error: Option<String>,
    pub latency_milliseconds: u64,
}

async fn check_provider<P: DatabaseProvider>(provider: &P) -> ConnectionTestResult {
    let started = Instant::now();
    let outcome: Result<String, DatabaseError> = async {
        provider.ping().await?;
        provider.server_version().await
    }
    .await;
    let latency_milliseconds = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(version) => ConnectionTestResult {
            success: true,
            server_version: Some(version),
            error: None,
            latency_milliseconds,
        },
        Err(error) => ConnectionTestResult {
            success: false,
            server_version: None,
            error: Some(error.to_string()),
            latency_milliseconds,
        },
    }
}

fn not_found_as_connection(id: &str, error: StoreError) -> ApiError {
    match error {
        StoreError::NotFound(_) => ApiError::ConnectionNotFound(id.to_string()),
        other => ApiError::Storage(other),
    }
}

/// Saved connections plus one lazily opened provider per connection
pub struct ConnectionRegistry<F: ProviderFactory> {
    factory: F,
    store: JsonStore<ConnectionConfig>,
    providers: DashMap<String, Arc<F::Provider>>,
}

impl<F: ProviderFactory> ConnectionRegistry<F> {
    pub fn new(factory: F, store: JsonStore<ConnectionConfig>) -> Self {
        Self {
            factory,
            store,
            providers: DashMap::new(),
        }
    }

    /// All connections ordered by name
    pub async fn list(&self) -> Vec<ConnectionItem> {
        let mut connections: Vec<ConnectionItem> =
            self.store.list().await.iter().map(ConnectionItem::from).collect();
        connections.sort_by(|left, right| left.name.to_lowercase().cmp(&right.name.to_lowercase()));
        connections
    }

    pub async fn get(&self, id: &str) -> Result<ConnectionConfig, ApiError> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| ApiError::ConnectionNotFound(id.to_string()))
    }

    pub async fn create(&self, request: ConnectionRequest) -> Result<ConnectionConfig, ApiError> {
        request.validate()?;
        let config = request.into_config(uuid::Uuid::new_v4().to_string(), Utc::now());
        self.store.insert(config.clone()).await?;
        info!(id = %config.id, name = %config.name, host = %config.host, "Connection created");
        Ok(config)
    }

    /// Replace a connection's settings and drop its open provider
    pub async fn update(&self, id: &str, request: ConnectionRequest) -> Result<ConnectionConfig, ApiError> {
        request.validate()?;
        let updated = self
            .store
            .update(id, |config| {
                config.name = request.name;
                config.host = request.host;
                config.port = request.port;
                config.database = request.database;
                config.username = request.username;
                if let Some(password) = request.password {
                    config.password = password;
                }
                config.ssl_mode = request.ssl_mode;
                config.updated_at = Utc::now();
            })
            .await
            .map_err(|error| not_found_as_connection(id, error))?;
        self.providers.remove(id);
        info!(id, "Connection updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.store
            .remove(id)
            .await
            .map_err(|error| not_found_as_connection(id, error))?;
        self.providers.remove(id);
        info!(id, "Connection deleted");
        Ok(())
    }

    /// Provider for a saved connection, opened on first use
    pub async fn provider(&self, id: &str) -> Result<Arc<F::Provider>, ApiError> {
        if let Some(provider) = self.providers.get(id) {
            return Ok(provider.clone());
        }

        let config = self.get(id).await?;
        let provider = Arc::new(self.factory.connect(&config).await?);
        let provider = self
            .providers
            .entry(id.to_string())
            .or_insert(provider)
            .clone();
        Ok(provider)
    }

    /// Try a connection without saving it
    pub async fn test(&self, request: ConnectionRequest) -> Result<ConnectionTestResult, ApiError> {
        request.validate()?;
        let config = request.into_config(String::new(), Utc::now());
        let result = match self.factory.connect(&config).await {
            Ok(provider) => check_provider(&provider).await,
            Err(error) => ConnectionTestResult {
                success: false,
                server_version: None,
                error: Some(error.to_string()),
                latency_milliseconds: 0,
            },
        };
        if !result.success {
            warn!(host = %config.host, database = %config.database, error = ?result.error, "Connection test failed");
        }
        Ok(result)
    }

    /// Test a saved connection through its pooled provider
    pub async fn ping(&self, id: &str) -> Result<ConnectionTestResult, ApiError> {
        let provider = self.provider(id).await?;
        Ok(check_provider(provider.as_ref()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::PostgresFactory;
    use crate::options::ViewerOptions;
    use serde_json::json;

    fn request(name: &str) -> ConnectionRequest {
        serde_json::from_value(json!({
            "name": name,
            "host": "localhost",
            "database": "app",
            "username": "postgres",
            "password": "secret"
        }))
        .unwrap()
    }

    #[test]
    fn test_request_defaults() {
        let parsed = request("local");
        assert_eq!(parsed.port, 5432);
        assert_eq!(parsed.ssl_mode, SslMode::Prefer);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_request_validation() {
        let mut invalid = request("");
        invalid.port = 0;
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("name"));
        assert!(fields.contains_key("port"));
    }

    fn registry(store: JsonStore<ConnectionConfig>) -> ConnectionRegistry<PostgresFactory> {
        ConnectionRegistry::new(PostgresFactory::new(&ViewerOptions::default()), store)
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let connections = registry(JsonStore::in_memory());
        assert!(matches!(
            connections.update("missing", request("x")).await,
            Err(ApiError::ConnectionNotFound(_))
        ));
        assert!(matches!(
            connections.delete("missing").await,
            Err(ApiError::ConnectionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_failure_is_a_storage_error() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("connections.json");
        let connections = registry(JsonStore::open(&path).await.unwrap());
        let created = connections.create(request("before")).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        assert!(matches!(
            connections.update(&created.id, request("after")).await,
            Err(ApiError::Storage(StoreError::Io(_)))
        ));
        assert_eq!(connections.get(&created.id).await.unwrap().name, "before");

        assert!(matches!(
            connections.delete(&created.id).await,
            Err(ApiError::Storage(StoreError::Io(_)))
        ));
        assert!(connections.get(&created.id).await.is_ok());
    }

    #[test]
    fn test_item_hides_password() {
        let config = request("local").into_config("id-1".to_string(), Utc::now());
        let item = serde_json::to_value(ConnectionItem::from(&config)).unwrap();
        assert!(item.get("password").is_none());
        assert_eq!(item["hasPassword"], true);
        assert_eq!(item["sslMode"], "prefer");
    }
}
