//! Raw SQL execution and query-builder endpoints

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::api::SharedState;
use crate::cache::invalidation_for;
use crate::database::{DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::schema::{QueryRequest, QueryResult};
use crate::sql::builder::build_select;
use crate::sql::{bind_parameters, format_sql, statement_kind, SelectSpec};
use crate::store::QueryHistoryItem;

/// Handler for POST /api/connections/{id}/query
///
/// Executes a raw SQL statement and returns the results. `:name`, `$name`
/// and `?` placeholders are bound from `parameters`.
///
/// # Security Warning
///
/// This endpoint allows executing ANY SQL statement including DDL. Anyone who
/// can reach the server can do anything the connection's role can.
///
/// Request body:
/// ```json
/// {
///   "sql": "SELECT * FROM users WHERE id = :id",
///   "parameters": { "id": 7 }
/// }
/// ```
///
/// Response (successful SELECT):
/// ```json
/// {
///   "columns": ["id", "name", "email"],
///   "rows": [...],
///   "affectedRows": 0,
///   "executionTimeMilliseconds": 12,
///   "error": null
/// }
/// ```
///
/// A failed statement answers with the same shape, `error` set, and a 4xx/5xx
/// status. Every attempt is recorded in the query history.
pub async fn execute_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Json(request): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    if request.sql.trim().is_empty() {
        return Err(ApiError::InvalidRequest("sql must not be empty".to_string()));
    }

    let provider = state.connections.provider(&id).await?;
    let (sql, values) = bind_parameters(&request.sql, &request.parameters)?;
    info!(connection = %id, parameters = values.len(), "Executing SQL query");

    let started = Instant::now();
    let outcome = provider.execute_query(&sql, &values).await;
    let elapsed = started.elapsed().as_millis() as u64;

    let (status, result) = match outcome {
        Ok(result) => {
            state.cache.apply(&id, invalidation_for(statement_kind(&sql)));
            (StatusCode::OK, result)
        }
        Err(error) => {
            let api_error = ApiError::from(error);
            warn!(connection = %id, "Query failed: {}", api_error);
            (api_error.status_and_code().0, QueryResult::failure(api_error.to_string(), elapsed))
        }
    };

    let history_item = QueryHistoryItem {
        id: uuid::Uuid::new_v4().to_string(),
        connection_id: id.clone(),
        sql: request.sql,
        success: result.error.is_none(),
        error: result.error.clone(),
        row_count: result.rows.len() as u64,
        affected_rows: result.affected_rows,
        execution_time_milliseconds: result.execution_time_milliseconds,
        executed_at: Utc::now(),
    };
    if let Err(error) = state.history.record(history_item).await {
        warn!(connection = %id, "Failed to record query history: {}", error);
    }

    Ok((status, Json(result)).into_response())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildQueryResponse {
    pub sql: String,
    pub formatted_sql: String,
    /// Text-encoded values for `$1..$n`, ready to post as `parameters`
    pub params: Vec<Option<String>>,
}

/// Handler for POST /api/connections/{id}/query/build
///
/// Turns a visual query-builder description into parameterized SQL. Every
/// referenced table is introspected so column names can be validated.
pub async fn build_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Json(spec): Json<SelectSpec>,
) -> Result<Json<BuildQueryResponse>, ApiError> {
    let mut tables = Vec::new();
    for (schema, table) in spec.referenced_tables() {
        tables.push(state.table_schema(&id, &schema, &table).await?);
    }

    let built = build_select(&spec, &tables)?;
    Ok(Json(BuildQueryResponse {
        formatted_sql: format_sql(&built.sql),
        sql: built.sql,
        params: built.params,
    }))
}
