use crate::auth::{AuthUser, session};
use crate::db::models::{Event, EventKind, NewEvent, NewService, Service};
use crate::error::AppError;
use crate::permission::{self, ensure, level};
use crate::routes::{AppState, Payload, done, required};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::Redirect,
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/services/@me", get(mine).post(create))
        .route("/services/@me/public", get(mine_public))
        .route("/services/@me/private", get(mine_private))
        .route("/services/search/{input}", get(search))
        .route("/services/callback", get(callback))
        .route("/services/{id}", get(show).put(update).delete(remove))
        .route("/services/{id}/users", get(users).post(add_user))
        .route("/services/{id}/users/{user_id}", delete(remove_user))
        .route("/services/{id}/triggers", get(triggers))
        .route("/services/{id}/actions", get(actions))
        .route("/services/{id}/events", post(create_event))
        .route(
            "/services/{id}/events/{event_id}",
            put(update_event).delete(remove_event),
        )
        .route("/services/{id}/connect", get(connect))
}

/// A service registration without its client credentials
#[derive(Debug, Serialize)]
pub struct ServiceSummary {
    pub id: i64,
    pub name: String,
    pub scope: String,
    pub auth_url: String,
    pub token_url: String,
    pub owner_id: i64,
    pub users_id: Vec<i64>,
    pub is_private: bool,
}

impl From<Service> for ServiceSummary {
    fn from(service: Service) -> Self {
        Self {
            id: service.id,
            name: service.name,
            scope: service.scope,
            auth_url: service.auth_url,
            token_url: service.token_url,
            owner_id: service.owner_id,
            users_id: service.users_id,
            is_private: service.is_private,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServiceView {
    Full(Service),
    Redacted(ServiceSummary),
}

#[derive(Debug, Deserialize)]
pub struct CreateServiceRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub auth_url: String,
    #[serde(default)]
    pub token_url: String,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateServiceRequest {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub is_private: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceUserRequest {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Option<EventKind>,
    #[serde(default = "empty_object")]
    pub workflow: Value,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateEventRequest {
    pub name: Option<String>,
    pub workflow: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    /// Session token for browser redirects that cannot set headers
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

async fn load(state: &AppState, id: i64) -> Result<Option<Service>, AppError> {
    state.stores.services.find(id).await
}

async fn mine(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Service>>, AppError> {
    Ok(Json(state.stores.services.list_by_owner(user.id).await?))
}

async fn mine_public(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Service>>, AppError> {
    let services = state.stores.services.list_by_owner(user.id).await?;
    Ok(Json(services.into_iter().filter(|s| !s.is_private).collect()))
}

async fn mine_private(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<Service>>, AppError> {
    let services = state.stores.services.list_by_owner(user.id).await?;
    Ok(Json(services.into_iter().filter(|s| s.is_private).collect()))
}

/// Register a third-party OAuth application
///
/// # Errors
/// - 422 if a credential or endpoint is blank, or `is_private` is missing
async fn create(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Payload(body): Payload<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    required("name", &body.name)?;
    required("client_id", &body.client_id)?;
    required("client_secret", &body.client_secret)?;
    required("auth_url", &body.auth_url)?;
    required("token_url", &body.token_url)?;
    let is_private = body
        .is_private
        .ok_or_else(|| AppError::unprocessable("Missing field: is_private"))?;

    let service = state
        .stores
        .services
        .create(NewService {
            name: body.name,
            client_id: body.client_id,
            client_secret: body.client_secret,
            scope: body.scope,
            auth_url: body.auth_url,
            token_url: body.token_url,
            owner_id: user.id,
            is_private,
        })
        .await?;

    tracing::info!(
        service_id = service.id,
        name = %service.name,
        owner_id = user.id,
        "Registered service"
    );

    Ok((StatusCode::CREATED, Json(service)))
}

async fn search(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(input): Path<String>,
) -> Result<Json<Vec<ServiceSummary>>, AppError> {
    let services = state.stores.services.search_public(&input).await?;
    Ok(Json(services.into_iter().map(ServiceSummary::from).collect()))
}

/// Credentials are only shown to the owner and members
async fn show(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ServiceView>, AppError> {
    let service = ensure(user.id, load(&state, id).await?, level::VIEW)?;

    let view = if permission::membership(user.id, &service).is_some() {
        ServiceView::Full(service)
    } else {
        ServiceView::Redacted(service.into())
    };
    Ok(Json(view))
}

async fn update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<UpdateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    let mut service = ensure(user.id, load(&state, id).await?, level::EDIT)?;

    let strings = [
        ("name", body.name, &mut service.name),
        ("client_id", body.client_id, &mut service.client_id),
        ("client_secret", body.client_secret, &mut service.client_secret),
        ("auth_url", body.auth_url, &mut service.auth_url),
        ("token_url", body.token_url, &mut service.token_url),
    ];
    for (field, value, slot) in strings {
        if let Some(value) = value {
            required(field, &value)?;
            *slot = value;
        }
    }
    if let Some(scope) = body.scope {
        service.scope = scope;
    }
    if let Some(is_private) = body.is_private {
        service.is_private = is_private;
    }

    let updated = state
        .stores
        .services
        .update(&service)
        .await?
        .ok_or(AppError::NotFound("Service"))?;

    Ok(Json(updated))
}

async fn remove(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Value>, AppError> {
    ensure(user.id, load(&state, id).await?, level::MANAGE)?;

    state.stores.services.delete(id).await?;
    tracing::info!(service_id = id, user_id = user.id, "Deleted service");

    Ok(done("Service has been deleted successfully"))
}

async fn users(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<i64>>, AppError> {
    let service = ensure(user.id, load(&state, id).await?, level::VIEW)?;
    Ok(Json(service.users_id))
}

async fn add_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<ServiceUserRequest>,
) -> Result<Json<Vec<i64>>, AppError> {
    let mut service = ensure(user.id, load(&state, id).await?, level::MANAGE)?;

    if body.id == service.owner_id {
        return Err(AppError::unprocessable("The owner cannot also be a member"));
    }
    if state.stores.users.find(body.id).await?.is_none() {
        return Err(AppError::NotFound("User"));
    }

    if !service.users_id.contains(&body.id) {
        service.users_id.push(body.id);
        state.stores.services.update(&service).await?;
    }

    Ok(Json(service.users_id))
}

async fn remove_user(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(i64, i64)>,
) -> Result<Json<Vec<i64>>, AppError> {
    let mut service = ensure(user.id, load(&state, id).await?, level::MANAGE)?;

    if !service.users_id.contains(&member_id) {
        return Err(AppError::NotFound("Member"));
    }
    service.users_id.retain(|id| *id != member_id);
    state.stores.services.update(&service).await?;

    Ok(Json(service.users_id))
}

async fn events_of(
    state: &AppState,
    user_id: i64,
    id: i64,
    kind: EventKind,
) -> Result<Json<Vec<Event>>, AppError> {
    ensure(user_id, load(state, id).await?, level::VIEW)?;
    Ok(Json(state.stores.events.list_by_service(id, kind).await?))
}

async fn triggers(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Event>>, AppError> {
    events_of(&state, user.id, id, EventKind::Trigger).await
}

async fn actions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Event>>, AppError> {
    events_of(&state, user.id, id, EventKind::Action).await
}

async fn create_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Payload(body): Payload<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    ensure(user.id, load(&state, id).await?, level::EDIT)?;
    required("name", &body.name)?;
    let kind = body
        .kind
        .ok_or_else(|| AppError::unprocessable("Missing field: type"))?;

    let event = state
        .stores
        .events
        .create(NewEvent {
            name: body.name,
            service_id: id,
            workflow: body.workflow,
            kind,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// An event of another service is reported as missing
async fn load_event(state: &AppState, service_id: i64, event_id: i64) -> Result<Event, AppError> {
    state
        .stores
        .events
        .find(event_id)
        .await?
        .filter(|event| event.service_id == service_id)
        .ok_or(AppError::NotFound("Event"))
}

async fn update_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, event_id)): Path<(i64, i64)>,
    Payload(body): Payload<UpdateEventRequest>,
) -> Result<Json<Event>, AppError> {
    ensure(user.id, load(&state, id).await?, level::EDIT)?;
    let mut event = load_event(&state, id, event_id).await?;

    if let Some(name) = body.name {
        required("name", &name)?;
        event.name = name;
    }
    if let Some(workflow) = body.workflow {
        event.workflow = workflow;
    }

    let updated = state
        .stores
        .events
        .update(&event)
        .await?
        .ok_or(AppError::NotFound("Event"))?;

    Ok(Json(updated))
}

async fn remove_event(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, event_id)): Path<(i64, i64)>,
) -> Result<Json<Value>, AppError> {
    ensure(user.id, load(&state, id).await?, level::EDIT)?;
    load_event(&state, id, event_id).await?;

    state.stores.events.delete(event_id).await?;
    Ok(done("Event has been deleted successfully"))
}

/// Start the OAuth flow for a service
///
/// # Endpoint
/// GET /services/{id}/connect?token=<jwt>
///
/// The session comes from the `Authorization` header or, for plain browser
/// navigation, the `token` query parameter.
///
/// # Returns
/// 303 redirect to the provider's consent page
async fn connect(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
) -> Result<Redirect, AppError> {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or(query.token)
        .ok_or_else(|| AppError::Unauthorized("missing session token".to_string()))?;
    let user = session::resolve(&state, &credential).await?;

    let service = ensure(user.id, load(&state, id).await?, level::VIEW)?;
    let url = state.broker.authorization_url(&service, user.id)?;

    tracing::info!(service_id = id, user_id = user.id, "Redirecting to provider authorization");

    Ok(Redirect::to(&url))
}

/// Provider redirect target
///
/// # Endpoint
/// GET /services/callback?code=<code>&state=<signed state>
///
/// # Errors
/// - 400 if `state` is missing, forged or expired
/// - 422 if `code` is missing
/// - 502 if the provider refused the authorization or the exchange
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<Value>, AppError> {
    if let Some(error) = query.error {
        return Err(AppError::OAuthExchangeFailed(format!(
            "authorization refused: {}",
            error
        )));
    }

    let raw_state = query
        .state
        .ok_or_else(|| AppError::OAuthStateInvalid("missing state".to_string()))?;
    let verified = state.broker.verify_state(&raw_state)?;

    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| AppError::unprocessable("Missing field: code"))?;

    // Access may have been revoked while the user was at the provider
    let service = ensure(
        verified.user_id,
        load(&state, verified.service_id).await?,
        level::VIEW,
    )?;

    state
        .broker
        .connect(&service, verified.user_id, &code)
        .await?;

    Ok(done("success"))
}

#[cfg(test)]
mod tests {
    use crate::oauth::broker::tests::spawn_provider;
    use crate::routes::tests::{app, json_body, send, sign_up};
    use axum::Router;
    use axum::http::{Method, StatusCode, header::LOCATION};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    async fn register_service(app: &Router, token: &str, base: &str, is_private: bool) -> Value {
        let response = send(
            app,
            Method::POST,
            "/services/@me",
            Some(token),
            Some(json!({
                "name": "spotify",
                "client_id": "cid",
                "client_secret": "csecret",
                "scope": "user-modify-playback-state",
                "auth_url": format!("{}/authorize", base),
                "token_url": format!("{}/token", base),
                "is_private": is_private
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        json_body(response).await
    }

    #[tokio::test]
    async fn test_create_requires_privacy_flag() {
        let (app, _) = app();
        let (token, _) = sign_up(&app, "alice").await;

        let response = send(
            &app,
            Method::POST,
            "/services/@me",
            Some(&token),
            Some(json!({
                "name": "spotify",
                "client_id": "cid",
                "client_secret": "csecret",
                "auth_url": "https://a.example/authorize",
                "token_url": "https://a.example/token"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_outsiders_never_see_credentials() {
        let (app, _) = app();
        let (owner, _) = sign_up(&app, "alice").await;
        let (outsider, _) = sign_up(&app, "bob").await;
        let public = register_service(&app, &owner, "https://a.example", false).await;
        let private = register_service(&app, &owner, "https://a.example", true).await;
        let public_uri = format!("/services/{}", public["id"]);
        let private_uri = format!("/services/{}", private["id"]);

        let response = send(&app, Method::GET, &public_uri, Some(&outsider), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert!(body.get("client_secret").is_none());
        assert!(body.get("client_id").is_none());

        let response = send(&app, Method::GET, &private_uri, Some(&outsider), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, Method::GET, &public_uri, Some(&owner), None).await;
        assert_eq!(json_body(response).await["client_secret"], "csecret");

        let uri = "/services/search/spot";
        let response = send(&app, Method::GET, uri, Some(&outsider), None).await;
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert!(body[0].get("client_secret").is_none());

        let uri = "/services/@me/private";
        let response = send(&app, Method::GET, uri, Some(&owner), None).await;
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_members_and_events() {
        let (app, _) = app();
        let (owner, _) = sign_up(&app, "alice").await;
        let (member, member_id) = sign_up(&app, "bob").await;
        let service = register_service(&app, &owner, "https://a.example", true).await;
        let base = format!("/services/{}", service["id"]);
        let events_uri = format!("{}/events", base);
        let users_uri = format!("{}/users", base);

        let response = send(
            &app,
            Method::POST,
            &events_uri,
            Some(&member),
            Some(json!({ "name": "x", "type": "trigger" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json!({ "id": member_id });
        let response = send(&app, Method::POST, &users_uri, Some(&owner), Some(body)).await;
        assert_eq!(json_body(response).await, json!([member_id]));

        let response = send(
            &app,
            Method::POST,
            &events_uri,
            Some(&member),
            Some(json!({ "name": "spotify.not_playing", "type": "trigger" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let event_id = json_body(response).await["id"].as_i64().unwrap();

        let uri = format!("{}/triggers", base);
        let response = send(&app, Method::GET, &uri, Some(&member), None).await;
        assert_eq!(json_body(response).await[0]["type"], "trigger");
        let uri = format!("{}/actions", base);
        let response = send(&app, Method::GET, &uri, Some(&member), None).await;
        assert_eq!(json_body(response).await, json!([]));

        let event_uri = format!("{}/events/{}", base, event_id);
        let body = json!({ "name": "renamed" });
        let response = send(&app, Method::PUT, &event_uri, Some(&member), Some(body)).await;
        assert_eq!(json_body(response).await["name"], "renamed");
        let body = json!({ "type": "action" });
        let response = send(&app, Method::PUT, &event_uri, Some(&member), Some(body)).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = send(&app, Method::DELETE, &event_uri, Some(&member), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let uri = format!("{}/{}", users_uri, member_id);
        let response = send(&app, Method::DELETE, &uri, Some(&owner), None).await;
        assert_eq!(json_body(response).await, json!([]));
    }

    #[tokio::test]
    async fn test_connect_and_callback_round_trip() {
        let provider = spawn_provider().await;
        let (app, state) = app();
        let (token, user_id) = sign_up(&app, "alice").await;
        let service = register_service(&app, &token, &provider, false).await;

        let uri = format!("/services/{}/connect?token={}", service["id"], token);
        let response = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let location = response.headers()[LOCATION].to_str().unwrap().to_string();
        assert!(location.starts_with(&format!("{}/authorize?", provider)));
        let query: HashMap<String, String> = reqwest::Url::parse(&location)
            .unwrap()
            .query_pairs()
            .into_owned()
            .collect();

        let callback = reqwest::Url::parse_with_params(
            "http://localhost/services/callback",
            &[("code", "good-code"), ("state", query["state"].as_str())],
        )
        .unwrap();
        let callback_uri = format!("{}?{}", callback.path(), callback.query().unwrap());
        let response = send(&app, Method::GET, &callback_uri, None, None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let user = state.stores.users.find(user_id).await.unwrap().unwrap();
        assert_eq!(user.services["spotify"].access_token, "access-1");
    }

    #[tokio::test]
    async fn test_callback_rejects_forged_state() {
        let (app, state) = app();
        let (token, user_id) = sign_up(&app, "alice").await;
        let service = register_service(&app, &token, "https://a.example", false).await;

        let uri = format!("/services/callback?code=abc&state={},{}", service["id"], user_id);
        let response = send(&app, Method::GET, &uri, None, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let user = state.stores.users.find(user_id).await.unwrap().unwrap();
        assert!(user.services.is_empty());
    }

    #[tokio::test]
    async fn test_connect_requires_session() {
        let (app, _) = app();
        let response = send(&app, Method::GET, "/services/1/connect", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
