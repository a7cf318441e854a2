use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application-specific errors with HTTP status code mappings
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Unprocessable input: {0}")]
    UnprocessableInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("OAuth state invalid: {0}")]
    OAuthStateInvalid(String),

    #[error("OAuth state expired")]
    OAuthStateExpired,

    #[error("OAuth exchange failed: {0}")]
    OAuthExchangeFailed(String),

    #[error("Provider API error: {0}")]
    ProviderApi(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn unprocessable(msg: impl Into<String>) -> Self {
        AppError::UnprocessableInput(msg.into())
    }
}

/// Unique-constraint violations are conflicts, not server errors
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return AppError::Conflict(format!(
                    "Duplicate value for {}",
                    db.constraint().unwrap_or("a unique field")
                ));
            }
        }
        AppError::Database(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::NotFound(what) => {
                tracing::debug!(resource = what, "Resource not found");
                (StatusCode::NOT_FOUND, format!("{} not found", what))
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::UnprocessableInput(msg) => {
                tracing::warn!("Unprocessable input: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::Conflict(msg) => {
                tracing::warn!("Conflict: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }
            AppError::OAuthStateInvalid(msg) => {
                tracing::warn!("OAuth state invalid: {}", msg);
                (StatusCode::BAD_REQUEST, "Invalid OAuth state".to_string())
            }
            AppError::OAuthStateExpired => {
                tracing::warn!("OAuth state expired");
                (
                    StatusCode::BAD_REQUEST,
                    "OAuth state expired, please try again".to_string(),
                )
            }
            AppError::OAuthExchangeFailed(msg) => {
                tracing::error!("OAuth exchange failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "OAuth exchange failed".to_string())
            }
            AppError::ProviderApi(msg) => {
                tracing::error!("Provider API error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Provider API error".to_string())
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": error_message }))).into_response()
    }
}
