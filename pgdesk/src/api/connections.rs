//! Saved connection endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::api::SharedState;
use crate::connections::{ConnectionItem, ConnectionRequest, ConnectionTestResult};
use crate::database::ProviderFactory;
use crate::error::ApiError;

/// Handler for GET /api/connections
pub async fn list_connections_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
) -> Json<Vec<ConnectionItem>> {
    Json(state.connections.list().await)
}

/// Handler for POST /api/connections
///
/// Request body:
/// ```json
/// {
///   "name": "local",
///   "host": "localhost",
///   "port": 5432,
///   "database": "app",
///   "username": "postgres",
///   "password": "secret",
///   "sslMode": "prefer"
/// }
/// ```
pub async fn create_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Json(request): Json<ConnectionRequest>,
) -> Result<(StatusCode, Json<ConnectionItem>), ApiError> {
    let config = state.connections.create(request).await?;
    Ok((StatusCode::CREATED, Json(ConnectionItem::from(&config))))
}

/// Handler for GET /api/connections/{id}
pub async fn get_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionItem>, ApiError> {
    let config = state.connections.get(&id).await?;
    Ok(Json(ConnectionItem::from(&config)))
}

/// Handler for PUT /api/connections/{id}
///
/// Omitting `password` keeps the stored one. Cached metadata for the
/// connection is dropped since it may now point at another database.
pub async fn update_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<ConnectionItem>, ApiError> {
    let config = state.connections.update(&id, request).await?;
    state.cache.invalidate_connection(&id);
    Ok(Json(ConnectionItem::from(&config)))
}

/// Handler for DELETE /api/connections/{id}
pub async fn delete_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.connections.delete(&id).await?;
    state.cache.invalidate_connection(&id);
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /api/connections/test
///
/// Connects with the posted settings without saving them. A failed
/// connection is still a 200 response with `success: false`.
pub async fn test_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Json(request): Json<ConnectionRequest>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    Ok(Json(state.connections.test(request).await?))
}

/// Handler for GET /api/connections/{id}/ping
pub async fn ping_connection_handler<F: ProviderFactory>(
    State(state): State<SharedState<F>>,
    Path(id): Path<String>,
) -> Result<Json<ConnectionTestResult>, ApiError> {
    Ok(Json(state.connections.ping(&id).await?))
}
