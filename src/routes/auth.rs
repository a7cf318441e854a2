use crate::auth::password::{hash_password, verify_password};
use crate::db::models::{AccountType, NewUser, User};
use crate::error::AppError;
use crate::routes::{AppState, Payload, required};
use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Create a password account
///
/// # Endpoint
/// POST /auth/register
///
/// # Errors
/// - 422 if a field is missing or blank
/// - 409 if the username or email is taken
async fn register(
    State(state): State<AppState>,
    Payload(body): Payload<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    required("username", &body.username)?;
    required("email", &body.email)?;
    required("password", &body.password)?;

    if state.stores.users.exists(&body.username, &body.email).await? {
        return Err(AppError::Conflict(
            "Username or email already registered".to_string(),
        ));
    }

    let user = state
        .stores
        .users
        .create(NewUser {
            username: body.username,
            email: body.email,
            password_hash: Some(hash_password(&body.password)?),
            account_type: AccountType::Default,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "Registered user");

    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange credentials for a session token
///
/// # Endpoint
/// POST /auth/login
///
/// # Returns
/// `{"jwt": "Bearer <token>"}`
///
/// # Errors
/// - 404 if no user matches the username or email
/// - 401 if the password is wrong or the account has none
async fn login(
    State(state): State<AppState>,
    Payload(body): Payload<LoginRequest>,
) -> Result<Json<Value>, AppError> {
    required("username", &body.username)?;
    required("password", &body.password)?;

    let user = state
        .stores
        .users
        .find_by_login(&body.username)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    let valid = match user.password_hash.as_deref() {
        Some(hash) => verify_password(&body.password, hash)?,
        None => false,
    };
    if !valid {
        return Err(AppError::Unauthorized(format!(
            "bad credentials for user {}",
            user.id
        )));
    }

    let token = state.jwt.issue(&user)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(json!({ "jwt": format!("Bearer {}", token) })))
}
