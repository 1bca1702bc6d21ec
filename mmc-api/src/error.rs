//! Error types for mmc-api

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Method not supported on this path (405); holds the `Allow` value
    #[error("Method not allowed, use {0}")]
    MethodNotAllowed(&'static str),

    /// Missing or unknown client key (401)
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// mmc-common error
    #[error(transparent)]
    Common(#[from] mmc_common::Error),
}

fn json_error(status: StatusCode, code: &str, message: String) -> Response {
    let body = Json(json!({
        "error": {
            "code": code,
            "message": message,
        }
    }));
    (status, body).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use mmc_common::Error as E;

        match self {
            ApiError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::MethodNotAllowed(allow) => {
                let mut response = json_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "METHOD_NOT_ALLOWED",
                    format!("Method not allowed, use {}", allow),
                );
                response
                    .headers_mut()
                    .insert(header::ALLOW, header::HeaderValue::from_static(allow));
                response
            }
            ApiError::Unauthenticated(msg) => {
                let mut response = json_error(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg);
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    header::HeaderValue::from_static("key"),
                );
                response
            }
            ApiError::Internal(msg) => {
                error!("Internal error: {}", msg);
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
            ApiError::Common(err) => match err {
                E::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "NOT_FOUND", msg),
                // Duplicates answer with the bare message
                E::DuplicateTrack { .. } | E::DuplicateCollection { .. } => {
                    (StatusCode::BAD_REQUEST, err.to_string()).into_response()
                }
                E::InvalidInput(msg) => json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
                E::Contention(msg) => {
                    json_error(StatusCode::SERVICE_UNAVAILABLE, "CONTENTION", msg)
                }
                other => {
                    error!("Request failed: {:?}", other);
                    json_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        other.to_string(),
                    )
                }
            },
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::MethodNotAllowed("GET"), StatusCode::METHOD_NOT_ALLOWED),
            (ApiError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (
                ApiError::Common(mmc_common::Error::Contention("busy".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Common(mmc_common::Error::DuplicateTrack {
                    other_track: 1,
                    attribute: "url".into(),
                }),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::Common(mmc_common::Error::Internal("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = ApiError::MethodNotAllowed("GET, PUT").into_response();
        assert_eq!(response.headers()[header::ALLOW], "GET, PUT");
    }

    #[test]
    fn test_unauthenticated_sets_challenge() {
        let response = ApiError::Unauthenticated("no key".into()).into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "key");
    }
}
