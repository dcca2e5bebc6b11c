//! REST API endpoints
//!
//! Every handler is generic over the [`ProviderFactory`] so the router can be
//! driven by a mock backend in tests.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::cache::{MetadataCache, QueryKey};
use crate::connections::ConnectionRegistry;
use crate::database::{DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::options::ViewerOptions;
use crate::schema::{TableInfo, TableSchema};
use crate::store::{HistoryStore, SavedQueryStore, Stores};

pub mod connections;
pub mod export;
pub mod history;
pub mod query;
pub mod rows;
pub mod saved_queries;
pub mod sql;
pub mod tables;

/// Everything the handlers share
pub struct AppState<F: ProviderFactory> {
    pub options: ViewerOptions,
    pub connections: ConnectionRegistry<F>,
    pub cache: MetadataCache,
    pub saved_queries: SavedQueryStore,
    pub history: HistoryStore,
}

/// State handle extracted by handlers
pub type SharedState<F> = Arc<AppState<F>>;

impl<F: ProviderFactory> AppState<F> {
    pub fn new(options: ViewerOptions, factory: F, stores: Stores) -> Self {
        let cache = MetadataCache::new(options.cache_stale_time, options.cache_max_entries);
        Self {
            connections: ConnectionRegistry::new(factory, stores.connections),
            cache,
            saved_queries: stores.saved_queries,
            history: stores.history,
            options,
        }
    }

    /// Introspected table, served from the metadata cache when fresh
    pub async fn table_schema(
        &self,
        connection_id: &str,
        schema: &str,
        table: &str,
    ) -> Result<TableSchema, ApiError> {
        let provider = self.connections.provider(connection_id).await?;
        self.cache
            .get_or_load(&QueryKey::table_schema(connection_id, schema, table), move || async move {
                provider.get_table_schema(schema, table).await.map_err(ApiError::from)
            })
            .await
    }

    /// Relations of one schema, served from the metadata cache when fresh
    pub async fn tables(&self, connection_id: &str, schema: &str) -> Result<Vec<TableInfo>, ApiError> {
        let provider = self.connections.provider(connection_id).await?;
        self.cache
            .get_or_load(&QueryKey::tables(connection_id, schema), move || async move {
                provider.list_tables(schema).await.map_err(ApiError::from)
            })
            .await
    }
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Create the API router with all endpoints
///
/// Routes are relative; the caller nests the router under `{base_path}/api`.
pub fn create_api_router<F: ProviderFactory>(state: SharedState<F>) -> Router {
    let table = "/connections/{id}/schemas/{schema}/tables/{table}";

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/connections",
            get(connections::list_connections_handler::<F>)
                .post(connections::create_connection_handler::<F>),
        )
        .route("/connections/test", post(connections::test_connection_handler::<F>))
        .route(
            "/connections/{id}",
            get(connections::get_connection_handler::<F>)
                .put(connections::update_connection_handler::<F>)
                .delete(connections::delete_connection_handler::<F>),
        )
        .route("/connections/{id}/ping", get(connections::ping_connection_handler::<F>))
        .route("/connections/{id}/schemas", get(tables::list_schemas_handler::<F>))
        .route(
            "/connections/{id}/schemas/{schema}/tables",
            get(tables::list_tables_handler::<F>),
        )
        .route(
            "/connections/{id}/schemas/{schema}/relationships",
            get(tables::list_relationships_handler::<F>),
        )
        .route(
            "/connections/{id}/schemas/{schema}/recommendations",
            get(tables::recommendations_handler::<F>),
        )
        .route(table, get(tables::get_table_schema_handler::<F>))
        .route(
            &format!("{}/rows", table),
            get(rows::get_rows_handler::<F>)
                .post(rows::insert_row_handler::<F>)
                .put(rows::update_row_handler::<F>)
                .delete(rows::delete_rows_handler::<F>),
        )
        .route(&format!("{}/rows/query", table), post(rows::query_rows_handler::<F>))
        .route(&format!("{}/count", table), get(rows::count_rows_handler::<F>))
        .route(
            &format!("{}/columns/{{column}}/pattern", table),
            get(tables::column_pattern_handler::<F>),
        )
        .route(&format!("{}/export", table), post(export::export_table_handler::<F>))
        .route("/connections/{id}/query", post(query::execute_query_handler::<F>))
        .route("/connections/{id}/query/build", post(query::build_query_handler::<F>))
        .route("/connections/{id}/query/export", post(export::export_query_handler::<F>))
        .route("/connections/{id}/search", get(tables::search_handler::<F>))
        .route("/sql/parameters", post(sql::scan_parameters_handler))
        .route("/sql/format", post(sql::format_sql_handler))
        .route("/patterns/detect", post(sql::detect_pattern_handler))
        .route(
            "/saved-queries",
            get(saved_queries::list_saved_queries_handler::<F>)
                .post(saved_queries::create_saved_query_handler::<F>),
        )
        .route(
            "/saved-queries/{id}",
            get(saved_queries::get_saved_query_handler::<F>)
                .put(saved_queries::update_saved_query_handler::<F>)
                .delete(saved_queries::delete_saved_query_handler::<F>),
        )
        .route(
            "/history",
            get(history::list_history_handler::<F>).delete(history::clear_history_handler::<F>),
        )
        .with_state(state)
}
