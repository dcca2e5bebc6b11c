//! Stateless SQL helper endpoints: parameter scanning, formatting, pattern detection

use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::patterns::{detect_pattern, DetectRequest, PatternMatch};
use crate::sql::{format_sql, scan_parameters, statement_kind, SqlParameter, StatementKind};

#[derive(Debug, Clone, Deserialize)]
pub struct SqlTextRequest {
    pub sql: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParametersResponse {
    pub parameters: Vec<SqlParameter>,
    pub statement_kind: StatementKind,
}

/// Handler for POST /api/sql/parameters
///
/// Lists the `:name`, `$name` and `?` placeholders in the posted SQL so the
/// front-end can ask for their values.
pub async fn scan_parameters_handler(Json(request): Json<SqlTextRequest>) -> Json<ParametersResponse> {
    Json(ParametersResponse {
        parameters: scan_parameters(&request.sql),
        statement_kind: statement_kind(&request.sql),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct FormatResponse {
    pub sql: String,
}

/// Handler for POST /api/sql/format
pub async fn format_sql_handler(Json(request): Json<SqlTextRequest>) -> Json<FormatResponse> {
    Json(FormatResponse {
        sql: format_sql(&request.sql),
    })
}

/// Handler for POST /api/patterns/detect
///
/// Responds with `null` when no pattern fits the values.
pub async fn detect_pattern_handler(
    Json(request): Json<DetectRequest>,
) -> Result<Json<Option<PatternMatch>>, ApiError> {
    if request.values.len() > 10_000 {
        return Err(ApiError::PayloadTooLarge(format!(
            "{} values posted, at most 10000 are classified",
            request.values.len()
        )));
    }
    Ok(Json(detect_pattern(&request.column, &request.values)))
}
