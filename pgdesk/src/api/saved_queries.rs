//! Saved query endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use validator::Validate;

use crate::api::SharedState;
use crate::database::ProviderFactory;
use crate::error::ApiError;
use crate::store::{SavedQuery, SavedQueryRequest};

/// Handler for GET /api/saved-queries
pub async fn list_saved_queries_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
) -> Json<Vec<SavedQuery>> {
    Json(state.saved_queries.list().await)
}

/// Handler for POST /api/saved-queries
pub async fn create_saved_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Json(request): Json<SavedQueryRequest>,
) -> Result<(StatusCode, Json<SavedQuery>), ApiError> {
    request.validate()?;
    let saved = state.saved_queries.create(request).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Handler for GET /api/saved-queries/{id}
pub async fn get_saved_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<Json<SavedQuery>, ApiError> {
    state
        .saved_queries
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("saved query {}", id)))
}

/// Handler for PUT /api/saved-queries/{id}
pub async fn update_saved_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Json(request): Json<SavedQueryRequest>,
) -> Result<Json<SavedQuery>, ApiError> {
    request.validate()?;
    Ok(Json(state.saved_queries.update(&id, request).await?))
}

/// Handler for DELETE /api/saved-queries/{id}
pub async fn delete_saved_query_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.saved_queries.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
