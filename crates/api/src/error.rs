// ---------------------------------------------------------------------------
// API error types
// ---------------------------------------------------------------------------

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use patchscout_common::ScoutError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request: bad query or invalid state transition.
    BadRequest(String),
    /// 404 Not Found.
    NotFound(String),
    /// 422 Unprocessable Entity: malformed body or invalid scan parameters.
    InvalidInput(String),
    /// 429 Too Many Requests: scan creation rate exceeded.
    RateLimited(String),
    /// 500 Internal Server Error. The detail is logged, not returned.
    Internal(String),
}

/// Detail of a 500 response, kept as a response extension so debug mode can
/// put it back into the body.
#[derive(Debug, Clone)]
pub struct InternalDetail(pub String);

const GENERIC_INTERNAL_MESSAGE: &str = "An error occurred processing your request";

impl From<ScoutError> for ApiError {
    fn from(e: ScoutError) -> Self {
        match e {
            ScoutError::ScanNotFound(_) | ScoutError::VulnerabilityNotFound(_) => {
                ApiError::NotFound(e.to_string())
            }
            ScoutError::InvalidState(msg) => ApiError::BadRequest(msg),
            ScoutError::InvalidInput(_) | ScoutError::UnknownTool(_) => {
                ApiError::InvalidInput(e.to_string())
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut detail = None;
        let (status, error_key, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::InvalidInput(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg)
            }
            ApiError::RateLimited(msg) => (StatusCode::TOO_MANY_REQUESTS, "rate_limited", msg),
            ApiError::Internal(msg) => {
                tracing::error!(details = %msg, "internal server error");
                detail = Some(InternalDetail(msg));
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    GENERIC_INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let mut response = (
            status,
            Json(ApiErrorBody {
                error: error_key.into(),
                message,
            }),
        )
            .into_response();
        if let Some(detail) = detail {
            response.extensions_mut().insert(detail);
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "bad request: {msg}"),
            ApiError::NotFound(msg) => write!(f, "not found: {msg}"),
            ApiError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            ApiError::RateLimited(msg) => write!(f, "rate limited: {msg}"),
            ApiError::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scout_errors_map_to_status_codes() {
        let cases = [
            (ScoutError::ScanNotFound(1), StatusCode::NOT_FOUND),
            (ScoutError::VulnerabilityNotFound(2), StatusCode::NOT_FOUND),
            (ScoutError::InvalidState("Scan is not running".into()), StatusCode::BAD_REQUEST),
            (ScoutError::InvalidInput("bad".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ScoutError::Storage("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn internal_detail_is_kept_out_of_the_body() {
        let response = ApiError::Internal("database is locked".into()).into_response();
        let detail = response.extensions().get::<InternalDetail>().unwrap();
        assert_eq!(detail.0, "database is locked");
    }
}
