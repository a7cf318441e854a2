use crate::auth::AuthUser;
use crate::db::models::{Member, NewWorkspace, Workspace};
use crate::error::AppError;
use crate::permission::{self, ensure, level};
use crate::routes::automates::AutomateView;
use crate::routes::{AppState, Payload, done, required};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
};
use serde::Deserialize;
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/workspaces", get(list).post(create))
        .route("/workspaces/search/{input}", get(search))
        .route("/workspaces/{id}", get(show).put(update).delete(remove))
        .route("/workspaces/{id}/users", get(members).post(add_member))
        .route("/workspaces/{id}/users/{user_id}", delete(remove_member))
        .route("/workspaces/{id}/automates", get(automates))
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkspaceRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub users_id: Vec<Member>,
    #[serde(default = "empty_object")]
    pub variables: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateWorkspaceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_private: Option<bool>,
    pub variables: Option<Value>,
    pub is_enabled: Option<bool>,
}

fn check_level(permission: u8) -> Result<(), AppError> {
    if permission > level::OWNER {
        return Err(AppError::unprocessable(format!(
            "Permission level must be between {} and {}",
            level::VIEW,
            level::OWNER
        )));
    }
    Ok(())
}

async fn list(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Workspace>>, AppError> {
    Ok(Json(state.stores.workspaces.list_for_user(user.id).await?))
}

/// Create a workspace owned by the caller
///
/// # Errors
/// - 422 if the title is blank, a member has an invalid level, or the owner
///   is listed as a member
async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Payload(body): Payload<CreateWorkspaceRequest>,
) -> Result<(StatusCode, Json<Workspace>), AppError> {
    required("title", &body.title)?;

    let mut users_id: Vec<Member> = Vec::with_capacity(body.users_id.len());
    for member in body.users_id {
        check_level(member.permission)?;
        if member.id == user.id {
            return Err(AppError::unprocessable("The owner cannot also be a member"));
        }
        if !users_id.iter().any(|m| m.id == member.id) {
            users_id.push(member);
        }
    }

    let workspace = state
        .stores
        .workspaces
        .create(NewWorkspace {
            title: body.title,
            description: body.description,
            is_private: body.is_private,
            owner_id: user.id,
            users_id,
            variables: body.variables,
        })
        .await?;

    tracing::info!(workspace_id = workspace.id, owner_id = user.id, "Created workspace");

    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn search(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(input): Path<String>,
) -> Result<Json<Vec<Workspace>>, AppError> {
    Ok(Json(state.stores.workspaces.search_public(&input).await?))
}

async fn show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Workspace>, AppError> {
    let workspace = state.stores.workspaces.find(id).await?;
    Ok(Json(ensure(user.id, workspace, level::VIEW)?))
}

/// Edit content; changing privacy needs management rights
async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<UpdateWorkspaceRequest>,
) -> Result<Json<Workspace>, AppError> {
    let mut workspace = ensure(
        user.id,
        state.stores.workspaces.find(id).await?,
        level::EDIT,
    )?;

    if let Some(is_private) = body.is_private {
        if is_private != workspace.is_private
            && permission::membership(user.id, &workspace) < Some(level::MANAGE)
        {
            return Err(AppError::Forbidden);
        }
        workspace.is_private = is_private;
    }
    if let Some(title) = body.title {
        required("title", &title)?;
        workspace.title = title;
    }
    if let Some(description) = body.description {
        workspace.description = description;
    }
    if let Some(variables) = body.variables {
        workspace.variables = variables;
    }
    if let Some(is_enabled) = body.is_enabled {
        workspace.is_enabled = is_enabled;
    }

    let updated = state
        .stores
        .workspaces
        .update(&workspace)
        .await?
        .ok_or(AppError::NotFound("Workspace"))?;

    Ok(Json(updated))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    ensure(
        user.id,
        state.stores.workspaces.find(id).await?,
        level::OWNER,
    )?;

    state.stores.workspaces.delete(id).await?;
    tracing::info!(workspace_id = id, user_id = user.id, "Deleted workspace");

    Ok(done("Workspace deleted successfully"))
}

async fn members(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Member>>, AppError> {
    let workspace = ensure(user.id, state.stores.workspaces.find(id).await?, level::VIEW)?;
    Ok(Json(workspace.users_id))
}

/// Add a member or change their level
///
/// A manager can only grant, or alter members at, levels up to their own.
async fn add_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<Member>,
) -> Result<Json<Vec<Member>>, AppError> {
    let mut workspace = ensure(
        user.id,
        state.stores.workspaces.find(id).await?,
        level::MANAGE,
    )?;
    let own = permission::membership(user.id, &workspace).unwrap_or(level::VIEW);

    check_level(body.permission)?;
    if body.permission > own {
        return Err(AppError::Forbidden);
    }
    if body.id == workspace.owner_id {
        return Err(AppError::unprocessable("The owner cannot also be a member"));
    }
    if state.stores.users.find(body.id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    match workspace.users_id.iter_mut().find(|m| m.id == body.id) {
        Some(existing) if existing.permission > own => return Err(AppError::Forbidden),
        Some(existing) => existing.permission = body.permission,
        None => workspace.users_id.push(body),
    }

    let updated = state
        .stores
        .workspaces
        .update(&workspace)
        .await?
        .ok_or(AppError::NotFound("Workspace"))?;

    tracing::info!(
        workspace_id = id,
        member_id = body.id,
        permission = body.permission,
        "Updated workspace member"
    );

    Ok(Json(updated.users_id))
}

async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<Member>>, AppError> {
    let mut workspace = ensure(
        user.id,
        state.stores.workspaces.find(id).await?,
        level::MANAGE,
    )?;
    let own = permission::membership(user.id, &workspace).unwrap_or(level::VIEW);

    let target = workspace
        .users_id
        .iter()
        .find(|m| m.id == member_id)
        .ok_or(AppError::NotFound("Member"))?;
    if target.permission > own {
        return Err(AppError::Forbidden);
    }

    workspace.users_id.retain(|m| m.id != member_id);
    let updated = state
        .stores
        .workspaces
        .update(&workspace)
        .await?
        .ok_or(AppError::NotFound("Workspace"))?;

    Ok(Json(updated.users_id))
}

/// Automates of the workspace; outsiders get the redacted view
async fn automates(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<AutomateView>>, AppError> {
    let workspace = ensure(user.id, state.stores.workspaces.find(id).await?, level::VIEW)?;
    let is_member = permission::membership(user.id, &workspace).is_some();

    let automates = state.stores.automates.list_by_workspace(id).await?;
    Ok(Json(
        automates
            .into_iter()
            .map(|a| AutomateView::new(a, is_member))
            .collect(),
    ))
}
