//! File export endpoints

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use tracing::info;

use crate::api::SharedState;
use crate::database::{DatabaseProvider, ProviderFactory};
use crate::error::ApiError;
use crate::export::{content_disposition, file_name, render, ExportFormat, QueryExportRequest, TableExportRequest};
use crate::sql::{bind_parameters, qualified_name, quote_identifier, statement_kind, StatementKind};

fn attachment(format: ExportFormat, base_name: &str, body: String) -> Response {
    let name = file_name(base_name, format);
    (
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CONTENT_DISPOSITION, content_disposition(&name)),
        ],
        body,
    )
        .into_response()
}

/// Handler for POST …/tables/{table}/export
///
/// Exports the filtered and sorted table, at most `max_result_rows` rows.
pub async fn export_table_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path((id, schema, table)): Path<(String, String, String)>,
    Json(request): Json<TableExportRequest>,
) -> Result<Response, ApiError> {
    let max_rows = state.options.max_result_rows;
    let mut query = request.query;
    query.limit = Some(query.limit.unwrap_or(max_rows).min(max_rows));

    let table_schema = state.table_schema(&id, &schema, &table).await?;
    let provider = state.connections.provider(&id).await?;
    let rows = provider.get_rows(&table_schema, query).await?;
    info!(connection = %id, schema = %schema, table = %table, rows = rows.rows.len(), format = ?request.format, "Exporting table");

    let body = render(
        request.format,
        &qualified_name(&schema, &table),
        &rows.columns,
        &rows.rows,
    );
    Ok(attachment(request.format, &format!("{}.{}", schema, table), body))
}

/// Handler for POST /api/connections/{id}/query/export
///
/// Runs the query and returns its result as a file. Only reading statements
/// are accepted. SQL exports insert into `tableName`, or `query_result` when
/// none is given.
pub async fn export_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Json(request): Json<QueryExportRequest>,
) -> Result<Response, ApiError> {
    if request.sql.trim().is_empty() {
        return Err(ApiError::InvalidRequest("sql must not be empty".to_string()));
    }
    if statement_kind(&request.sql) != StatementKind::Select {
        return Err(ApiError::InvalidRequest(
            "only read-only queries can be exported; run data changes through the query endpoint".to_string(),
        ));
    }

    let provider = state.connections.provider(&id).await?;
    let (sql, values) = bind_parameters(&request.sql, &request.parameters)?;
    let result = provider.execute_query(&sql, &values).await?;

    let target = quote_identifier(request.table_name.as_deref().unwrap_or("query_result"));
    let body = render(request.format, &target, &result.columns, &result.rows);
    let base_name = request.file_name.as_deref().unwrap_or("query_result");
    info!(connection = %id, rows = result.rows.len(), format = ?request.format, "Exporting query result");
    Ok(attachment(request.format, base_name, body))
}
