//! Persistent stores for connections, saved queries and query history
//!
//! Each store keeps its records in memory and, when opened on a data
//! directory, rewrites one JSON file after every change.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use validator::Validate;

use crate::connections::ConnectionConfig;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage format error: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// A record addressable by a string id
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

/// In-memory list of records with optional write-through to a JSON file
pub struct JsonStore<T> {
    path: Option<PathBuf>,
    records: RwLock<Vec<T>>,
}

impl<T: Record> JsonStore<T> {
    /// A store that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    /// Open a store backed by `path`, loading existing records
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(error.into()),
        };
        debug!(path = %path.display(), records = records.len(), "Opened store");
        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// All records in stored order
    pub async fn list(&self) -> Vec<T> {
        self.records.read().await.clone()
    }

    pub async fn get(&self, id: &str) -> Option<T> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.id() == id)
            .cloned()
    }

    /// Append a record
    pub async fn insert(&self, record: T) -> Result<(), StoreError> {
        self.modify(|records| records.push(record)).await
    }

    /// Apply `change` to the record with `id` and return the result
    pub async fn update<F>(&self, id: &str, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut T),
    {
        self.commit(|records| {
            let record = records
                .iter_mut()
                .find(|record| record.id() == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            change(record);
            Ok(record.clone())
        })
        .await
    }

    /// Remove the record with `id` and return it
    pub async fn remove(&self, id: &str) -> Result<T, StoreError> {
        self.commit(|records| {
            let position = records
                .iter()
                .position(|record| record.id() == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            Ok(records.remove(position))
        })
        .await
    }

    /// Run an arbitrary change over all records and persist
    pub async fn modify<F, R>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<T>) -> R,
    {
        self.commit(|records| Ok(change(records))).await
    }

    /// Apply `change` to a copy of the records, then persist the copy
    ///
    /// The in-memory records are replaced only after the write succeeds, so a
    /// failed change leaves memory and disk as they were.
    async fn commit<F, R>(&self, change: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<T>) -> Result<R, StoreError>,
    {
        let mut records = self.records.write().await;
        let mut working = records.clone();
        let result = change(&mut working)?;
        self.persist(&working).await?;
        *records = working;
        Ok(result)
    }

    async fn persist(&self, records: &[T]) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(records)?;
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

/// A named query kept for reuse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub id: String,
    pub name: String,
    pub sql: String,
    pub description: Option<String>,
    pub connection_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Record for SavedQuery {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Create/update body for a saved query
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SavedQueryRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(min = 1, message = "sql must not be empty"))]
    pub sql: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub connection_id: Option<String>,
}

/// Saved queries, most recently changed first
pub struct SavedQueryStore {
    inner: JsonStore<SavedQuery>,
}

impl SavedQueryStore {
    pub fn new(inner: JsonStore<SavedQuery>) -> Self {
        Self { inner }
    }

    pub async fn list(&self) -> Vec<SavedQuery> {
        let mut queries = self.inner.list().await;
        queries.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
        queries
    }

    pub async fn get(&self, id: &str) -> Option<SavedQuery> {
        self.inner.get(id).await
    }

    pub async fn create(&self, request: SavedQueryRequest) -> Result<SavedQuery, StoreError> {
        let now = Utc::now();
        let query = SavedQuery {
            id: uuid::Uuid::new_v4().to_string(),
            name: request.name,
            sql: request.sql,
            description: request.description,
            connection_id: request.connection_id,
            created_at: now,
            updated_at: now,
        };
        self.inner.insert(query.clone()).await?;
        info!(id = %query.id, name = %query.name, "Saved query created");
        Ok(query)
    }

    pub async fn update(&self, id: &str, request: SavedQueryRequest) -> Result<SavedQuery, StoreError> {
        self.inner
            .update(id, |query| {
                query.name = request.name;
                query.sql = request.sql;
                query.description = request.description;
                query.connection_id = request.connection_id;
                query.updated_at = Utc::now();
            })
            .await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.inner.remove(id).await.map(|_| ())
    }
}

/// One executed statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryHistoryItem {
    pub id: String,
    pub connection_id: String,
    pub sql: String,
    pub success: bool,
    pub error: Option<String>,
    pub row_count: u64,
    pub affected_rows: u64,
    pub execution_time_milliseconds: u64,
    pub executed_at: DateTime<Utc>,
}

impl Record for QueryHistoryItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Query history, newest first, bounded to `limit` entries
pub struct HistoryStore {
    inner: JsonStore<QueryHistoryItem>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(inner: JsonStore<QueryHistoryItem>, limit: usize) -> Self {
        Self { inner, limit }
    }

    /// Record an execution, dropping the oldest entries past the limit
    pub async fn record(&self, item: QueryHistoryItem) -> Result<(), StoreError> {
        let limit = self.limit;
        self.inner
            .modify(|items| {
                items.insert(0, item);
                items.truncate(limit);
            })
            .await
    }

    /// Newest entries, optionally for one connection only
    pub async fn list(&self, connection_id: Option<&str>, limit: Option<usize>) -> Vec<QueryHistoryItem> {
        self.inner
            .list()
            .await
            .into_iter()
            .filter(|item| connection_id.map_or(true, |id| item.connection_id == id))
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// Remove history entries, optionally for one connection only; returns how many were removed
    pub async fn clear(&self, connection_id: Option<&str>) -> Result<usize, StoreError> {
        self.inner
            .modify(|items| {
                let before = items.len();
                match connection_id {
                    Some(id) => items.retain(|item| item.connection_id != id),
                    None => items.clear(),
                }
                before - items.len()
            })
            .await
    }
}

/// The three stores the API works with
pub struct Stores {
    pub connections: JsonStore<ConnectionConfig>,
    pub saved_queries: SavedQueryStore,
    pub history: HistoryStore,
}

impl Stores {
    /// Stores that forget everything on exit
    pub fn in_memory(history_limit: usize) -> Self {
        Self {
            connections: JsonStore::in_memory(),
            saved_queries: SavedQueryStore::new(JsonStore::in_memory()),
            history: HistoryStore::new(JsonStore::in_memory(), history_limit),
        }
    }

    /// Stores persisted as JSON files under `data_dir`
    pub async fn open(data_dir: &Path, history_limit: usize) -> Result<Self, StoreError> {
        tokio::fs::create_dir_all(data_dir).await?;
        Ok(Self {
            connections: JsonStore::open(data_dir.join("connections.json")).await?,
            saved_queries: SavedQueryStore::new(JsonStore::open(data_dir.join("saved_queries.json")).await?),
            history: HistoryStore::new(JsonStore::open(data_dir.join("history.json")).await?, history_limit),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_item(connection_id: &str, sql: &str) -> QueryHistoryItem {
        QueryHistoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            connection_id: connection_id.to_string(),
            sql: sql.to_string(),
            success: true,
            error: None,
            row_count: 1,
            affected_rows: 0,
            execution_time_milliseconds: 3,
            executed_at: Utc::now(),
        }
    }

    fn saved_request(name: &str) -> SavedQueryRequest {
        SavedQueryRequest {
            name: name.to_string(),
            sql: "SELECT 1".to_string(),
            description: None,
            connection_id: None,
        }
    }

    #[tokio::test]
    async fn test_saved_query_crud() {
        let store = SavedQueryStore::new(JsonStore::in_memory());
        let created = store.create(saved_request("first")).await.unwrap();
        assert_eq!(store.get(&created.id).await.unwrap().name, "first");

        let updated = store.update(&created.id, saved_request("renamed")).await.unwrap();
        assert_eq!(updated.name, "renamed");
        assert!(updated.updated_at >= created.updated_at);

        store.delete(&created.id).await.unwrap();
        assert!(store.get(&created.id).await.is_none());
        assert!(matches!(store.delete(&created.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_history_is_bounded_and_newest_first() {
        let history = HistoryStore::new(JsonStore::in_memory(), 2);
        history.record(history_item("a", "SELECT 1")).await.unwrap();
        history.record(history_item("a", "SELECT 2")).await.unwrap();
        history.record(history_item("b", "SELECT 3")).await.unwrap();

        let items = history.list(None, None).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sql, "SELECT 3");
        assert_eq!(items[1].sql, "SELECT 2");

        assert_eq!(history.list(Some("a"), None).await.len(), 1);
        assert_eq!(history.list(None, Some(1)).await.len(), 1);
    }

    #[tokio::test]
    async fn test_history_clear_by_connection() {
        let history = HistoryStore::new(JsonStore::in_memory(), 10);
        history.record(history_item("a", "SELECT 1")).await.unwrap();
        history.record(history_item("b", "SELECT 2")).await.unwrap();

        assert_eq!(history.clear(Some("a")).await.unwrap(), 1);
        assert_eq!(history.list(None, None).await.len(), 1);
        assert_eq!(history.clear(None).await.unwrap(), 1);
        assert!(history.list(None, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let directory = tempfile::tempdir().unwrap();

        let stores = Stores::open(directory.path(), 10).await.unwrap();
        let created = stores.saved_queries.create(saved_request("kept")).await.unwrap();
        drop(stores);

        let reopened = Stores::open(directory.path(), 10).await.unwrap();
        let loaded = reopened.saved_queries.get(&created.id).await.unwrap();
        assert_eq!(loaded, created);
        assert!(directory.path().join("saved_queries.json").exists());
    }

    /// Put a non-empty directory where the store file goes so the next write fails
    fn block_store_file(path: &Path) {
        std::fs::remove_file(path).unwrap();
        std::fs::create_dir(path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();
    }

    #[tokio::test]
    async fn test_failed_write_keeps_records_unchanged() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("saved_queries.json");
        let store = SavedQueryStore::new(JsonStore::open(&path).await.unwrap());
        let created = store.create(saved_request("before")).await.unwrap();

        block_store_file(&path);

        let result = store.update(&created.id, saved_request("after")).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert_eq!(store.get(&created.id).await.unwrap().name, "before");

        assert!(matches!(store.delete(&created.id).await, Err(StoreError::Io(_))));
        assert!(store.get(&created.id).await.is_some());

        assert!(store.create(saved_request("other")).await.is_err());
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_opens_empty() {
        let directory = tempfile::tempdir().unwrap();
        let store: JsonStore<SavedQuery> = JsonStore::open(directory.path().join("absent.json")).await.unwrap();
        assert!(store.list().await.is_empty());
    }
}
