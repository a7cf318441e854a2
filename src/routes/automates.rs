use crate::auth::AuthUser;
use crate::db::models::{Automate, LogEntry, NewAutomate, Workspace};
use crate::error::AppError;
use crate::permission::{self, ensure, ensure_member, level};
use crate::routes::{AppState, Payload, done, required};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/automates", post(create))
        .route("/automates/search/{input}", get(search))
        .route("/automates/{id}", get(show).put(update).delete(remove))
        .route("/automates/{id}/workflow", put(update_workflow))
        .route("/automates/{id}/logs", get(logs).delete(clear_logs))
}

/// Fields visible to users outside the owning workspace
#[derive(Debug, Serialize)]
pub struct AutomateSummary {
    pub id: i64,
    pub title: String,
    pub is_private: bool,
    pub workspace_id: i64,
    pub is_enabled: bool,
    pub views: i64,
    pub workflow: Value,
}

impl From<Automate> for AutomateSummary {
    fn from(automate: Automate) -> Self {
        Self {
            id: automate.id,
            title: automate.title,
            is_private: automate.is_private,
            workspace_id: automate.workspace_id,
            is_enabled: automate.is_enabled,
            views: automate.views,
            workflow: automate.workflow,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AutomateView {
    Full(Automate),
    Redacted(AutomateSummary),
}

impl AutomateView {
    pub fn new(automate: Automate, is_member: bool) -> Self {
        if is_member {
            AutomateView::Full(automate)
        } else {
            AutomateView::Redacted(automate.into())
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

fn disabled() -> i32 {
    -1
}

#[derive(Debug, Deserialize)]
pub struct CreateAutomateRequest {
    #[serde(default)]
    pub title: String,
    pub workspace_id: Option<i64>,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default = "empty_object")]
    pub workflow: Value,
    #[serde(default = "empty_object")]
    pub variables: Value,
    #[serde(default = "disabled")]
    pub trigger: i32,
    #[serde(default)]
    pub trigger_option: String,
    #[serde(default = "disabled")]
    pub action: i32,
    #[serde(default)]
    pub action_option: String,
}

/// `workspace_id` is accepted only to reject a move to another workspace
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAutomateRequest {
    pub title: Option<String>,
    pub is_private: Option<bool>,
    pub is_enabled: Option<bool>,
    pub trigger: Option<i32>,
    pub trigger_option: Option<String>,
    pub action: Option<i32>,
    pub action_option: Option<String>,
    pub workspace_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowRequest {
    pub workflow: Value,
}

/// -1 disables; anything else must name a registry entry
fn check_indices(state: &AppState, trigger: i32, action: i32) -> Result<(), AppError> {
    if trigger != -1 && state.registry.trigger(trigger).is_none() {
        return Err(AppError::unprocessable(format!("Unknown trigger {}", trigger)));
    }
    if action != -1 && state.registry.action(action).is_none() {
        return Err(AppError::unprocessable(format!("Unknown action {}", action)));
    }
    Ok(())
}

/// Load an automate and the workspace that guards it
async fn load(state: &AppState, id: i64) -> Result<(Automate, Option<Workspace>), AppError> {
    let automate = state
        .stores
        .automates
        .find(id)
        .await?
        .ok_or(AppError::NotFound("Automate"))?;
    let workspace = state.stores.workspaces.find(automate.workspace_id).await?;
    Ok((automate, workspace))
}

/// Create an automate inside a workspace the caller can edit
///
/// # Errors
/// - 422 if title or workspace_id is missing, or an index is unknown
/// - 404 if the workspace does not exist
/// - 403 below edit level
async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Payload(body): Payload<CreateAutomateRequest>,
) -> Result<(StatusCode, Json<Automate>), AppError> {
    required("title", &body.title)?;
    let workspace_id = body
        .workspace_id
        .ok_or_else(|| AppError::unprocessable("Missing field: workspace_id"))?;
    check_indices(&state, body.trigger, body.action)?;

    ensure(
        user.id,
        state.stores.workspaces.find(workspace_id).await?,
        level::EDIT,
    )?;

    let automate = state
        .stores
        .automates
        .create(NewAutomate {
            title: body.title,
            is_private: body.is_private,
            workspace_id,
            workflow: body.workflow,
            variables: body.variables,
            trigger: body.trigger,
            trigger_option: body.trigger_option,
            action: body.action,
            action_option: body.action_option,
        })
        .await?;

    tracing::info!(automate_id = automate.id, workspace_id, user_id = user.id, "Created automate");

    Ok((StatusCode::CREATED, Json(automate)))
}

async fn search(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(input): Path<String>,
) -> Result<Json<Vec<AutomateSummary>>, AppError> {
    let automates = state.stores.automates.search_public(&input).await?;
    Ok(Json(automates.into_iter().map(AutomateSummary::from).collect()))
}

async fn show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<AutomateView>, AppError> {
    let (automate, workspace) = load(&state, id).await?;
    let workspace = ensure(user.id, workspace, level::VIEW)?;
    let is_member = permission::membership(user.id, &workspace).is_some();

    Ok(Json(AutomateView::new(automate, is_member)))
}

/// Update settings; the owning workspace can never change
///
/// # Errors
/// - 422 on unknown fields, a different `workspace_id`, or unknown indices
/// - 403 below manage level
async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<UpdateAutomateRequest>,
) -> Result<Json<Automate>, AppError> {
    let (mut automate, workspace) = load(&state, id).await?;
    ensure(user.id, workspace, level::MANAGE)?;

    if body
        .workspace_id
        .is_some_and(|workspace_id| workspace_id != automate.workspace_id)
    {
        tracing::warn!(automate_id = id, "Rejected attempt to move automate to another workspace");
        return Err(AppError::unprocessable("workspace_id cannot be changed"));
    }

    if let Some(title) = body.title {
        required("title", &title)?;
        automate.title = title;
    }
    if let Some(is_private) = body.is_private {
        automate.is_private = is_private;
    }
    if let Some(is_enabled) = body.is_enabled {
        automate.is_enabled = is_enabled;
    }
    if let Some(trigger) = body.trigger {
        automate.trigger = trigger;
    }
    if let Some(trigger_option) = body.trigger_option {
        automate.trigger_option = trigger_option;
    }
    if let Some(action) = body.action {
        automate.action = action;
    }
    if let Some(action_option) = body.action_option {
        automate.action_option = action_option;
    }
    check_indices(&state, automate.trigger, automate.action)?;

    let updated = state
        .stores
        .automates
        .update(&automate)
        .await?
        .ok_or(AppError::NotFound("Automate"))?;

    Ok(Json(updated))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let (_, workspace) = load(&state, id).await?;
    ensure(user.id, workspace, level::MANAGE)?;

    state.stores.automates.delete(id).await?;
    tracing::info!(automate_id = id, user_id = user.id, "Deleted automate");

    Ok(done("Automate deleted successfully"))
}

async fn update_workflow(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<WorkflowRequest>,
) -> Result<Json<Value>, AppError> {
    let (mut automate, workspace) = load(&state, id).await?;
    ensure(user.id, workspace, level::EDIT)?;

    if !body.workflow.is_object() {
        return Err(AppError::unprocessable("workflow must be an object"));
    }
    automate.workflow = body.workflow;
    state.stores.automates.update(&automate).await?;

    Ok(done("Automate updated successfully"))
}

/// Members only, even for public workspaces
async fn logs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<LogEntry>>, AppError> {
    let (automate, workspace) = load(&state, id).await?;
    ensure_member(user.id, workspace)?;

    Ok(Json(automate.logs))
}

async fn clear_logs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    let (_, workspace) = load(&state, id).await?;
    ensure(user.id, workspace, level::MANAGE)?;

    state.stores.automates.clear_logs(id).await?;
    Ok(done("Automate updated successfully"))
}
