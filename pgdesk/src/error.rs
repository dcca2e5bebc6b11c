//! Error types for the REST API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::database::DatabaseError;
use crate::store::StoreError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message.
    pub error: String,
    /// Error code.
    pub code: String,
}

/// API error types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No saved connection with this id.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Request body failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Database error.
    #[error(transparent)]
    Database(DatabaseError),

    /// Statement ran past the configured timeout.
    #[error("Query timeout exceeded")]
    Timeout,

    /// Result or upload above the configured limits.
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Persistent store failure.
    #[error("Storage error: {0}")]
    Storage(StoreError),

    /// Internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status and machine-readable code
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::ConnectionNotFound(_) => (StatusCode::NOT_FOUND, "CONNECTION_NOT_FOUND"),
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            ApiError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "QUERY_TIMEOUT"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Storage(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Database(database_error) => match database_error {
                DatabaseError::TableNotFound(_) => (StatusCode::NOT_FOUND, "TABLE_NOT_FOUND"),
                DatabaseError::InvalidColumn(_) => (StatusCode::BAD_REQUEST, "INVALID_COLUMN"),
                DatabaseError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
                DatabaseError::Timeout => (StatusCode::GATEWAY_TIMEOUT, "QUERY_TIMEOUT"),
                DatabaseError::TooManyRows(_) => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_MANY_ROWS"),
                DatabaseError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_FAILED"),
                DatabaseError::Serialization(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
                }
                DatabaseError::Query(_) => (StatusCode::BAD_REQUEST, "DATABASE_ERROR"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(code, "{}", self);
        } else {
            warn!(code, "{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::Timeout => ApiError::Timeout,
            other => ApiError::Database(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Storage(err)
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| match &error.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, error.code),
                })
            })
            .collect();
        messages.sort();
        ApiError::Validation(messages.join("; "))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[test]
    fn test_database_errors_map_to_statuses() {
        let cases = [
            (DatabaseError::TableNotFound("t".into()), StatusCode::NOT_FOUND),
            (DatabaseError::InvalidColumn("c".into()), StatusCode::BAD_REQUEST),
            (DatabaseError::TooManyRows(5), StatusCode::PAYLOAD_TOO_LARGE),
            (DatabaseError::Connection("refused".into()), StatusCode::BAD_GATEWAY),
            (DatabaseError::Query("syntax".into()), StatusCode::BAD_REQUEST),
        ];
        for (database_error, expected) in cases {
            assert_eq!(ApiError::from(database_error).status_and_code().0, expected);
        }
    }

    #[test]
    fn test_timeout_is_lifted() {
        let api_error = ApiError::from(DatabaseError::Timeout);
        assert!(matches!(api_error, ApiError::Timeout));
        assert_eq!(api_error.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_store_not_found_is_404() {
        let response = ApiError::from(StoreError::NotFound("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[derive(Validate)]
    struct Named {
        #[validate(length(min = 1, message = "must not be empty"))]
        name: String,
    }

    #[test]
    fn test_validation_errors_are_flattened() {
        let errors = Named { name: String::new() }.validate().unwrap_err();
        match ApiError::from(errors) {
            ApiError::Validation(message) => assert_eq!(message, "name: must not be empty"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            ApiError::ConnectionNotFound("abc".into()).to_string(),
            "Connection not found: abc"
        );
        assert_eq!(
            ApiError::Database(DatabaseError::InvalidColumn("c".into())).to_string(),
            "Invalid column: c"
        );
    }
}
