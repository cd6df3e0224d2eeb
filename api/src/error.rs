use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use relay_core::error::{self, ApiError};

/// Internal error type that converts to structured API responses
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Missing or invalid credentials (401)
    Unauthorized {
        message: String,
        docs_hint: Option<String>,
    },
    /// Authenticated but not allowed (403)
    Forbidden {
        message: String,
        docs_hint: Option<String>,
    },
    /// Resource does not exist (404)
    NotFound {
        message: String,
        docs_hint: Option<String>,
    },
    /// Method not supported by this route (405)
    MethodNotAllowed {
        message: String,
        docs_hint: Option<String>,
    },
    /// Uniqueness violation (409)
    Conflict {
        message: String,
        field: Option<String>,
        docs_hint: Option<String>,
    },
    /// Upstream returned a transport-level failure (502)
    BadGateway { message: String },
    /// Upstream did not answer in time (504)
    GatewayTimeout { message: String },
    /// Upstream is known to be down (503)
    UpstreamUnavailable { message: String },
    /// Database error (500)
    Database(sqlx::Error),
    /// Internal error (500)
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Unauthorized { message, docs_hint } => (
                StatusCode::UNAUTHORIZED,
                ApiError {
                    error: error::codes::UNAUTHORIZED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Forbidden { message, docs_hint } => (
                StatusCode::FORBIDDEN,
                ApiError {
                    error: error::codes::FORBIDDEN.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { message, docs_hint } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::MethodNotAllowed { message, docs_hint } => (
                StatusCode::METHOD_NOT_ALLOWED,
                ApiError {
                    error: error::codes::METHOD_NOT_ALLOWED.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::Conflict {
                message,
                field,
                docs_hint,
            } => (
                StatusCode::CONFLICT,
                ApiError {
                    error: error::codes::CONFLICT.to_string(),
                    message,
                    field,
                    received: None,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::BadGateway { message } => (
                StatusCode::BAD_GATEWAY,
                ApiError {
                    error: error::codes::BAD_GATEWAY.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some(
                        "The upstream service could not be reached. Check that its base URL \
                         is correct and the service is running."
                            .to_string(),
                    ),
                },
            ),
            AppError::GatewayTimeout { message } => (
                StatusCode::GATEWAY_TIMEOUT,
                ApiError {
                    error: error::codes::GATEWAY_TIMEOUT.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("The upstream service took too long to respond.".to_string()),
                },
            ),
            AppError::UpstreamUnavailable { message } => (
                StatusCode::SERVICE_UNAVAILABLE,
                ApiError {
                    error: error::codes::UPSTREAM_UNAVAILABLE.to_string(),
                    message,
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: None,
                },
            ),
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);

                // Unique constraint violations surface as conflicts
                if let sqlx::Error::Database(ref db_err) = err {
                    if db_err.code().as_deref() == Some("23505")
                        || db_err.code().as_deref() == Some("2067")
                    {
                        return AppError::Conflict {
                            message: "A record with the same unique value already exists"
                                .to_string(),
                            field: None,
                            docs_hint: None,
                        }
                        .into_response();
                    }
                }

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError {
                        error: error::codes::INTERNAL_ERROR.to_string(),
                        message: "An internal error occurred".to_string(),
                        field: None,
                        received: None,
                        request_id,
                        docs_hint: None,
                    },
                )
            }
        };

        (status, Json(api_error)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}
