use crate::auth::AuthUser;
use crate::auth::password::hash_password;
use crate::db::models::{AccountType, User};
use crate::error::AppError;
use crate::routes::{AppState, Payload, done, required};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/@me", get(me).put(update_me).delete(delete_me))
        .route("/users/@me/friends", get(friends).post(add_friend))
        .route("/users/@me/friends/{id}", delete(remove_friend))
        .route("/users/@me/services/{name}", delete(disconnect_service))
        .route("/users/search/{input}", get(search))
        .route("/users/{id}", get(profile))
}

/// What other users may see of an account
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: i64,
    pub username: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            account_type: user.account_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMeRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FriendRequest {
    pub id: i64,
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}

/// Change username, email or password
///
/// # Errors
/// - 422 on unknown or blank fields
/// - 409 if the new username or email belongs to someone else
async fn update_me(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Payload(body): Payload<UpdateMeRequest>,
) -> Result<Json<User>, AppError> {
    if let Some(username) = body.username {
        required("username", &username)?;
        ensure_login_free(&state, &username, user.id).await?;
        user.username = username;
    }
    if let Some(email) = body.email {
        required("email", &email)?;
        ensure_login_free(&state, &email, user.id).await?;
        user.email = email;
    }
    if let Some(password) = body.password {
        required("password", &password)?;
        user.password_hash = Some(hash_password(&password)?);
    }

    let updated = state
        .stores
        .users
        .update(&user)
        .await?
        .ok_or(AppError::NotFound("User"))?;

    Ok(Json(updated))
}

async fn ensure_login_free(state: &AppState, login: &str, self_id: i64) -> Result<(), AppError> {
    match state.stores.users.find_by_login(login).await? {
        Some(other) if other.id != self_id => {
            Err(AppError::Conflict(format!("{} is already taken", login)))
        }
        _ => Ok(()),
    }
}

async fn delete_me(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Value>, AppError> {
    state.stores.users.delete(user.id).await?;
    tracing::info!(user_id = user.id, "Deleted user");
    Ok(done("User deleted successfully"))
}

/// Friends that still exist
async fn friends(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let mut friends = Vec::with_capacity(user.friends.len());
    for id in &user.friends {
        if let Some(friend) = state.stores.users.find(*id).await? {
            friends.push(PublicUser::from(friend));
        }
    }
    Ok(Json(friends))
}

async fn add_friend(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Payload(body): Payload<FriendRequest>,
) -> Result<Json<Vec<i64>>, AppError> {
    if body.id == user.id {
        return Err(AppError::unprocessable("You cannot befriend yourself"));
    }
    if state.stores.users.find(body.id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    if !user.friends.contains(&body.id) {
        user.friends.push(body.id);
        state.stores.users.update(&user).await?;
    }

    Ok(Json(user.friends))
}

async fn remove_friend(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(friend_id): Path<i64>,
) -> Result<Json<Vec<i64>>, AppError> {
    let before = user.friends.len();
    user.friends.retain(|id| *id != friend_id);
    if user.friends.len() == before {
        return Err(AppError::NotFound("Friend"));
    }

    state.stores.users.update(&user).await?;
    Ok(Json(user.friends))
}

/// Drop the stored tokens for one connected service
async fn disconnect_service(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    if !state
        .stores
        .users
        .remove_service_tokens(user.id, &name)
        .await?
    {
        return Err(AppError::NotFound("Connected service"));
    }

    tracing::info!(user_id = user.id, service = %name, "Disconnected service");
    Ok(StatusCode::NO_CONTENT)
}

async fn search(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(input): Path<String>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.stores.users.search(&input).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

async fn profile(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, AppError> {
    state
        .stores
        .users
        .find(id)
        .await?
        .map(|user| Json(PublicUser::from(user)))
        .ok_or(AppError::NotFound("User"))
}
