//! Query history endpoints

use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};

use crate::api::SharedState;
use crate::database::ProviderFactory;
use crate::error::ApiError;
use crate::store::QueryHistoryItem;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub connection_id: Option<String>,
    pub limit: Option<usize>,
}

/// Handler for GET /api/history?connectionId=&limit=
///
/// Newest first.
pub async fn list_history_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Query(params): Query<HistoryParams>,
) -> Json<Vec<QueryHistoryItem>> {
    Json(
        state
            .history
            .list(params.connection_id.as_deref(), params.limit)
            .await,
    )
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub removed: usize,
}

/// Handler for DELETE /api/history?connectionId=
pub async fn clear_history_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let removed = state.history.clear(params.connection_id.as_deref()).await?;
    Ok(Json(ClearHistoryResponse { removed }))
}
