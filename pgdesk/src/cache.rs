//! Metadata cache keyed by hierarchical query keys
//!
//! Keys render to segment lists such as
//! `["connections", id, "schemas", "public", "tables"]`. Invalidating a key
//! drops every entry whose segments extend it, so dropping a connection's
//! key clears all of its schema metadata at once.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::sql::StatementKind;

/// Identifies one piece of cached data
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Connections,
    Connection { connection_id: String },
    Schemas { connection_id: String },
    Tables { connection_id: String, schema: String },
    TableSchema { connection_id: String, schema: String, table: String },
    Relationships { connection_id: String, schema: String },
    Recommendations { connection_id: String, schema: String },
}

impl QueryKey {
    pub fn connection(connection_id: &str) -> Self {
        QueryKey::Connection {
            connection_id: connection_id.to_string(),
        }
    }

    pub fn schemas(connection_id: &str) -> Self {
        QueryKey::Schemas {
            connection_id: connection_id.to_string(),
        }
    }

    pub fn tables(connection_id: &str, schema: &str) -> Self {
        QueryKey::Tables {
            connection_id: connection_id.to_string(),
            schema: schema.to_string(),
        }
    }

    pub fn table_schema(connection_id: &str, schema: &str, table: &str) -> Self {
        QueryKey::TableSchema {
            connection_id: connection_id.to_string(),
            schema: schema.to_string(),
            table: table.to_string(),
        }
    }

    pub fn relationships(connection_id: &str, schema: &str) -> Self {
        QueryKey::Relationships {
            connection_id: connection_id.to_string(),
            schema: schema.to_string(),
        }
    }

    pub fn recommendations(connection_id: &str, schema: &str) -> Self {
        QueryKey::Recommendations {
            connection_id: connection_id.to_string(),
            schema: schema.to_string(),
        }
    }

    /// Hierarchical segments, parents first
    pub fn segments(&self) -> Vec<String> {
        let schema_base = |connection_id: &str, schema: &str| {
            vec![
                "connections".to_string(),
                connection_id.to_string(),
                "schemas".to_string(),
                schema.to_string(),
            ]
        };

        match self {
            QueryKey::Connections => vec!["connections".to_string()],
            QueryKey::Connection { connection_id } => {
                vec!["connections".to_string(), connection_id.clone()]
            }
            QueryKey::Schemas { connection_id } => vec![
                "connections".to_string(),
                connection_id.clone(),
                "schemas".to_string(),
            ],
            QueryKey::Tables { connection_id, schema } => {
                let mut segments = schema_base(connection_id, schema);
                segments.push("tables".to_string());
                segments
            }
            QueryKey::TableSchema { connection_id, schema, table } => {
                let mut segments = schema_base(connection_id, schema);
                segments.push("tables".to_string());
                segments.push(table.clone());
                segments
            }
            QueryKey::Relationships { connection_id, schema } => {
                let mut segments = schema_base(connection_id, schema);
                segments.push("relationships".to_string());
                segments
            }
            QueryKey::Recommendations { connection_id, schema } => {
                let mut segments = schema_base(connection_id, schema);
                segments.push("recommendations".to_string());
                segments
            }
        }
    }
}

/// What a statement run through the query endpoint makes stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    Nothing,
    /// Table listings carry row estimates and sizes
    RowEstimates,
    /// Everything cached for the connection
    ConnectionMetadata,
}

/// Invalidation rule for a statement kind
pub fn invalidation_for(kind: StatementKind) -> Invalidation {
    if kind.changes_schema() {
        Invalidation::ConnectionMetadata
    } else if kind.changes_rows() {
        Invalidation::RowEstimates
    } else {
        Invalidation::Nothing
    }
}

struct CacheEntry {
    value: Value,
    stored_at: Instant,
    sequence: u64,
}

/// Catalog metadata cache shared by all handlers
pub struct MetadataCache {
    entries: DashMap<Vec<String>, CacheEntry>,
    stale_time: Duration,
    max_entries: usize,
    sequence: AtomicU64,
}

impl MetadataCache {
    pub fn new(stale_time: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            stale_time,
            max_entries: max_entries.max(1),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh cached value for `key`; stale entries are dropped
    pub fn get<T: DeserializeOwned>(&self, key: &QueryKey) -> Option<T> {
        let segments = key.segments();
        let value = {
            let entry = self.entries.get(&segments)?;
            if entry.stored_at.elapsed() < self.stale_time {
                Some(entry.value.clone())
            } else {
                None
            }
        };

        match value {
            Some(value) => {
                trace!(key = ?segments, "Cache hit");
                serde_json::from_value(value).ok()
            }
            None => {
                self.entries.remove(&segments);
                None
            }
        }
    }

    pub fn insert<T: Serialize>(&self, key: &QueryKey, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let segments = key.segments();
        if !self.entries.contains_key(&segments) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        self.entries.insert(
            segments,
            CacheEntry {
                value,
                stored_at: Instant::now(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
    }

    /// Cached value, or the result of `load` (cached on success)
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &QueryKey, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key) {
            return Ok(cached);
        }
        let loaded = load().await?;
        self.insert(key, &loaded);
        Ok(loaded)
    }

    /// Drop every entry whose segments start with `prefix`; returns how many
    pub fn invalidate(&self, prefix: &[String]) -> usize {
        let before = self.entries.len();
        self.entries.retain(|segments, _| !segments.starts_with(prefix));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(prefix = ?prefix, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Drop `key` and everything below it
    pub fn invalidate_key(&self, key: &QueryKey) -> usize {
        self.invalidate(&key.segments())
    }

    pub fn invalidate_connection(&self, connection_id: &str) -> usize {
        self.invalidate_key(&QueryKey::connection(connection_id))
    }

    /// Drop a table's schema plus the schema-level entries derived from it
    pub fn invalidate_table(&self, connection_id: &str, schema: &str, table: &str) -> usize {
        self.invalidate_key(&QueryKey::table_schema(connection_id, schema, table))
            + self.remove(&QueryKey::tables(connection_id, schema))
            + self.remove(&QueryKey::relationships(connection_id, schema))
            + self.remove(&QueryKey::recommendations(connection_id, schema))
            + self.remove(&QueryKey::schemas(connection_id))
    }

    /// Drop table listings of one schema after its rows changed
    pub fn invalidate_row_estimates(&self, connection_id: &str, schema: &str) -> usize {
        self.remove(&QueryKey::tables(connection_id, schema))
    }

    /// Apply the invalidation a statement on `connection_id` calls for
    pub fn apply(&self, connection_id: &str, invalidation: Invalidation) -> usize {
        match invalidation {
            Invalidation::Nothing => 0,
            Invalidation::ConnectionMetadata => self.invalidate_connection(connection_id),
            Invalidation::RowEstimates => {
                // the statement text does not say which schema it touched
                let before = self.entries.len();
                self.entries.retain(|segments, _| {
                    !(segments.len() == 5
                        && segments[0] == "connections"
                        && segments[1] == connection_id
                        && segments[4] == "tables")
                });
                before.saturating_sub(self.entries.len())
            }
        }
    }

    /// Drop exactly one key
    pub fn remove(&self, key: &QueryKey) -> usize {
        usize::from(self.entries.remove(&key.segments()).is_some())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().sequence)
            .map(|entry| entry.key().clone());
        if let Some(segments) = oldest {
            self.entries.remove(&segments);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> MetadataCache {
        MetadataCache::new(Duration::from_secs(60), 100)
    }

    #[test]
    fn test_segments_are_hierarchical() {
        assert_eq!(
            QueryKey::table_schema("c1", "public", "users").segments(),
            vec!["connections", "c1", "schemas", "public", "tables", "users"]
        );
        assert!(QueryKey::tables("c1", "public")
            .segments()
            .starts_with(&QueryKey::connection("c1").segments()));
    }

    #[test]
    fn test_insert_and_get() {
        let cache = cache();
        cache.insert(&QueryKey::schemas("c1"), &vec!["public".to_string()]);
        let cached: Option<Vec<String>> = cache.get(&QueryKey::schemas("c1"));
        assert_eq!(cached, Some(vec!["public".to_string()]));
        assert_eq!(cache.get::<Vec<String>>(&QueryKey::schemas("c2")), None);
    }

    #[test]
    fn test_stale_entries_are_dropped() {
        let cache = MetadataCache::new(Duration::ZERO, 10);
        cache.insert(&QueryKey::schemas("c1"), &1);
        assert_eq!(cache.get::<i32>(&QueryKey::schemas("c1")), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_prefix_invalidation() {
        let cache = cache();
        cache.insert(&QueryKey::schemas("c1"), &1);
        cache.insert(&QueryKey::tables("c1", "public"), &2);
        cache.insert(&QueryKey::table_schema("c1", "public", "users"), &3);
        cache.insert(&QueryKey::schemas("c2"), &4);

        assert_eq!(cache.invalidate_connection("c1"), 3);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<i32>(&QueryKey::schemas("c2")), Some(4));
    }

    #[test]
    fn test_prefix_does_not_match_partial_segments() {
        let cache = cache();
        cache.insert(&QueryKey::schemas("c1"), &1);
        cache.insert(&QueryKey::schemas("c10"), &2);
        cache.invalidate_connection("c1");
        assert_eq!(cache.get::<i32>(&QueryKey::schemas("c10")), Some(2));
    }

    #[test]
    fn test_table_invalidation_keeps_siblings() {
        let cache = cache();
        cache.insert(&QueryKey::table_schema("c1", "public", "users"), &1);
        cache.insert(&QueryKey::table_schema("c1", "public", "orders"), &2);
        cache.insert(&QueryKey::tables("c1", "public"), &3);

        cache.invalidate_table("c1", "public", "users");
        assert_eq!(cache.get::<i32>(&QueryKey::table_schema("c1", "public", "orders")), Some(2));
        assert_eq!(cache.get::<i32>(&QueryKey::tables("c1", "public")), None);
    }

    #[test]
    fn test_statement_invalidation_rules() {
        assert_eq!(invalidation_for(StatementKind::Select), Invalidation::Nothing);
        assert_eq!(invalidation_for(StatementKind::Update), Invalidation::RowEstimates);
        assert_eq!(invalidation_for(StatementKind::Ddl), Invalidation::ConnectionMetadata);

        let cache = cache();
        cache.insert(&QueryKey::tables("c1", "public"), &1);
        cache.insert(&QueryKey::tables("c1", "audit"), &1);
        cache.insert(&QueryKey::table_schema("c1", "public", "users"), &1);

        assert_eq!(cache.apply("c1", Invalidation::RowEstimates), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.apply("c1", Invalidation::ConnectionMetadata), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let cache = MetadataCache::new(Duration::from_secs(60), 2);
        cache.insert(&QueryKey::schemas("a"), &1);
        cache.insert(&QueryKey::schemas("b"), &2);
        cache.insert(&QueryKey::schemas("c"), &3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get::<i32>(&QueryKey::schemas("a")), None);
    }

    #[tokio::test]
    async fn test_get_or_load_caches_success_only() {
        let cache = cache();
        let key = QueryKey::schemas("c1");

        let failed: Result<i32, String> = cache.get_or_load(&key, || async { Err("down".to_string()) }).await;
        assert!(failed.is_err());
        assert!(cache.is_empty());

        let loaded: Result<i32, String> = cache.get_or_load(&key, || async { Ok(7) }).await;
        assert_eq!(loaded, Ok(7));
        let cached: Result<i32, String> = cache.get_or_load(&key, || async { Ok(8) }).await;
        assert_eq!(cached, Ok(7));
    }
}
