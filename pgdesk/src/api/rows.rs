//! Row browsing and editing endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use tracing::debug;

use crate::api::SharedState;
use crate::database::{DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::schema::{
    CountResponse, DeleteRowsRequest, InsertRowRequest, MutationResult, RowQuery, RowQueryParams,
    RowsResponse, UpdateRowRequest,
};

type TablePath = Path<(String, String, String)>;

async fn fetch_rows<F: ProviderFactory>(
    state: &SharedState<F>,
    (id, schema, table): (String, String, String),
    mut query: RowQuery,
) -> Result<RowsResponse, ApiError> {
    query.limit = Some(state.options.page_size(query.limit));
    debug!(connection = %id, schema = %schema, table = %table, offset = query.offset, limit = ?query.limit, "Fetching rows");

    let table_schema = state.table_schema(&id, &schema, &table).await?;
    let provider = state.connections.provider(&id).await?;
    Ok(provider.get_rows(&table_schema, query).await?)
}

/// Handler for GET …/tables/{table}/rows
///
/// Fetches rows from a table with pagination, sorting, and filtering.
///
/// Query parameters:
/// - offset: Starting row offset (default: 0)
/// - limit: Maximum rows to return (default and cap from configuration)
/// - sortBy: Column name to sort by (optional)
/// - sortOrder: "ascending" or "descending" (optional, default: "ascending")
/// - filters: JSON-encoded list of `{column, operator, value}` rules
/// - filterMode: "and" or "or" (default: "and")
pub async fn get_rows_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(path): TablePath,
    Query(params): Query<RowQueryParams>,
) -> Result<Json<RowsResponse>, ApiError> {
    let query = params.into_row_query()?;
    Ok(Json(fetch_rows(&state, path, query).await?))
}

/// Handler for POST …/tables/{table}/rows/query
///
/// Same as the GET form, with filters and multi-column sorts in a JSON body.
pub async fn query_rows_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(path): TablePath,
    Json(query): Json<RowQuery>,
) -> Result<Json<RowsResponse>, ApiError> {
    Ok(Json(fetch_rows(&state, path, query).await?))
}

/// Handler for GET …/tables/{table}/count
///
/// Returns the total row count for a table (with optional filters applied).
pub async fn count_rows_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): TablePath,
    Query(params): Query<RowQueryParams>,
) -> Result<Json<CountResponse>, ApiError> {
    let query = params.into_row_query()?;
    let table_schema = state.table_schema(&id, &schema, &table).await?;
    let provider = state.connections.provider(&id).await?;
    Ok(Json(provider.count_rows(&table_schema, &query).await?))
}

/// Handler for POST …/tables/{table}/rows
///
/// Omitted columns take their defaults; the stored row is returned.
pub async fn insert_row_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): TablePath,
    Json(request): Json<InsertRowRequest>,
) -> Result<(StatusCode, Json<MutationResult>), ApiError> {
    let provider = state.connections.provider(&id).await?;
    let result = provider.insert_row(&schema, &table, &request.values).await?;
    state.cache.invalidate_row_estimates(&id, &schema);
    Ok((StatusCode::CREATED, Json(result)))
}

/// Handler for PUT …/tables/{table}/rows
pub async fn update_row_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): TablePath,
    Json(request): Json<UpdateRowRequest>,
) -> Result<Json<MutationResult>, ApiError> {
    let provider = state.connections.provider(&id).await?;
    let result = provider
        .update_row(&schema, &table, &request.key, &request.values)
        .await?;
    if result.affected_rows == 0 {
        return Err(ApiError::NotFound(format!("no row in {}.{} matches the key", schema, table)));
    }
    Ok(Json(result))
}

/// Handler for DELETE …/tables/{table}/rows
///
/// Deletes every keyed row in one transaction; an empty key list is rejected.
pub async fn delete_rows_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): TablePath,
    Json(request): Json<DeleteRowsRequest>,
) -> Result<Json<MutationResult>, ApiError> {
    if request.keys.is_empty() {
        return Err(ApiError::InvalidRequest("no rows selected for deletion".to_string()));
    }
    let provider = state.connections.provider(&id).await?;
    let result = provider.delete_rows(&schema, &table, &request.keys).await?;
    state.cache.invalidate_row_estimates(&id, &schema);
    Ok(Json(result))
}
