use crate::db::models::User;
use crate::error::AppError;
use crate::routes::AppState;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};

/// The caller behind an `Authorization: Bearer <jwt>` header
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;

        resolve(state, header).await.map(AuthUser)
    }
}

/// Strip an optional `Bearer ` prefix
pub fn bearer_token(raw: &str) -> Option<&str> {
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve a bearer credential to the stored user
///
/// # Errors
/// `Unauthorized` when the token is empty, invalid, expired, or names a
/// user that no longer exists.
pub async fn resolve(state: &AppState, raw: &str) -> Result<User, AppError> {
    let token =
        bearer_token(raw).ok_or_else(|| AppError::Unauthorized("empty bearer token".to_string()))?;

    let claims = state.jwt.validate(token)?;
    let user_id = claims.user_id()?;

    state.stores.users.find(user_id).await?.ok_or_else(|| {
        tracing::warn!(user_id, "Token subject no longer exists");
        AppError::Unauthorized("user no longer exists".to_string())
    })
}
