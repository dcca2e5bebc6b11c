//! Schema, table and catalog endpoints

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::api::SharedState;
use crate::cache::QueryKey;
use crate::database::{DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::patterns::{detect_pattern, PatternMatch};
use crate::recommendations::{recommend, IndexRecommendation};
use crate::schema::{Relationship, SchemaInfo, SearchHit, TableKind, TableSchema, TablesResponse};

/// Largest number of hits a search returns
const MAX_SEARCH_RESULTS: u64 = 200;

/// Handler for GET /api/connections/{id}/schemas
pub async fn list_schemas_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<SchemaInfo>>, ApiError> {
    let provider = state.connections.provider(&id).await?;
    let schemas = state
        .cache
        .get_or_load(&QueryKey::schemas(&id), || async move {
            provider.list_schemas().await.map_err(ApiError::from)
        })
        .await?;
    Ok(Json(schemas))
}

/// Handler for GET /api/connections/{id}/schemas/{schema}/tables
///
/// Returns tables, views and materialized views with row estimates and sizes.
pub async fn list_tables_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema)): Path<(String, String)>,
) -> Result<Json<TablesResponse>, ApiError> {
    let tables = state.tables(&id, &schema).await?;
    Ok(Json(TablesResponse { tables }))
}

/// Handler for GET /api/connections/{id}/schemas/{schema}/tables/{table}
///
/// Returns the schema information for a specific table including columns,
/// primary keys, foreign keys, and indexes.
pub async fn get_table_schema_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): Path<(String, String, String)>,
) -> Result<Json<TableSchema>, ApiError> {
    Ok(Json(state.table_schema(&id, &schema, &table).await?))
}

/// Handler for GET /api/connections/{id}/schemas/{schema}/relationships
///
/// Foreign key edges for drawing an ER diagram of the schema.
pub async fn list_relationships_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema)): Path<(String, String)>,
) -> Result<Json<Vec<Relationship>>, ApiError> {
    let provider = state.connections.provider(&id).await?;
    let schema_name = schema.as_str();
    let relationships = state
        .cache
        .get_or_load(&QueryKey::relationships(&id, &schema), move || async move {
            provider.list_relationships(schema_name).await.map_err(ApiError::from)
        })
        .await?;
    Ok(Json(relationships))
}

/// Handler for GET /api/connections/{id}/schemas/{schema}/recommendations
pub async fn recommendations_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema)): Path<(String, String)>,
) -> Result<Json<Vec<IndexRecommendation>>, ApiError> {
    if let Some(cached) = state.cache.get(&QueryKey::recommendations(&id, &schema)) {
        return Ok(Json(cached));
    }

    let provider = state.connections.provider(&id).await?;
    let listed = state.tables(&id, &schema).await?;

    let mut tables = Vec::new();
    for info in listed.iter().filter(|info| info.kind == TableKind::Table) {
        tables.push(state.table_schema(&id, &schema, &info.name).await?);
    }
    let statistics = provider.table_statistics(&schema).await?;

    let recommendations = recommend(&tables, &statistics);
    state
        .cache
        .insert(&QueryKey::recommendations(&id, &schema), &recommendations);
    Ok(Json(recommendations))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<u64>,
}

/// Handler for GET /api/connections/{id}/search?q=
///
/// Tables first, then columns, matched case-insensitively on name.
pub async fn search_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let term = params.q.trim();
    if term.is_empty() {
        return Err(ApiError::InvalidRequest("search term must not be empty".to_string()));
    }

    let limit = params.limit.unwrap_or(50).clamp(1, MAX_SEARCH_RESULTS);
    let provider = state.connections.provider(&id).await?;
    Ok(Json(provider.search(term, limit).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnPatternResponse {
    pub column: String,
    pub sample_size: usize,
    pub pattern: Option<PatternMatch>,
}

/// Handler for GET …/tables/{table}/columns/{column}/pattern
pub async fn column_pattern_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table, column)): Path<(String, String, String, String)>,
) -> Result<Json<ColumnPatternResponse>, ApiError> {
    let provider = state.connections.provider(&id).await?;
    let sample = provider
        .column_sample(&schema, &table, &column, state.options.pattern_sample_size)
        .await?;

    Ok(Json(ColumnPatternResponse {
        pattern: detect_pattern(&column, &sample),
        sample_size: sample.len(),
        column,
    }))
}
