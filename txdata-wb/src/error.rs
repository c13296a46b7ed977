//! Error types for the workbench HTTP API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict (409), e.g. duplicate study name
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// txdata-common error
    #[error("{0}")]
    Common(#[from] txdata_common::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use txdata_common::Error as E;
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Common(E::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Common(E::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(E::Csv(_)) => StatusCode::BAD_REQUEST,
            ApiError::Common(E::Conflict(_)) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Common(txdata_common::Error::Database(err))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Common(txdata_common::Error::Json(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use txdata_common::Error as E;
        let status = self.status();
        let (error_code, message) = match self {
            ApiError::NotFound(msg) => ("NOT_FOUND", msg),
            ApiError::BadRequest(msg) => ("BAD_REQUEST", msg),
            ApiError::Unauthorized(msg) => ("UNAUTHORIZED", msg),
            ApiError::Forbidden(msg) => ("FORBIDDEN", msg),
            ApiError::Conflict(msg) => ("CONFLICT", msg),
            ApiError::Internal(msg) => ("INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => ("IO_ERROR", err.to_string()),
            ApiError::Other(ref err) => ("INTERNAL_ERROR", err.to_string()),
            ApiError::Common(err) => match err {
                E::NotFound(msg) => ("NOT_FOUND", msg),
                E::InvalidInput(msg) => ("BAD_REQUEST", msg),
                E::Conflict(msg) => ("CONFLICT", msg),
                E::Integrity(msg) => ("INTEGRITY_ERROR", msg),
                E::Csv(e) => ("BAD_REQUEST", format!("Could not read CSV data: {}", e)),
                other => ("COMMON_ERROR", other.to_string()),
            },
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_map_to_status() {
        let cases = [
            (txdata_common::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (txdata_common::Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (txdata_common::Error::Conflict("x".into()), StatusCode::CONFLICT),
            (txdata_common::Error::Integrity("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_response_body_shape() {
        let response = ApiError::Forbidden("not yours".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
