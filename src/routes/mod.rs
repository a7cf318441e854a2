pub mod auth;
pub mod automates;
pub mod services;
pub mod users;
pub mod workspaces;

use crate::auth::{AuthUser, JwtKeys};
use crate::config::Config;
use crate::db::Stores;
use crate::error::AppError;
use crate::oauth::OAuthBroker;
use crate::scheduler::registry::{Registry, RegistryListing};
use crate::spotify::{SpotifyIntegration, client::SpotifyClient};
use axum::{
    Json, Router,
    extract::{FromRequest, Request, State, rejection::JsonRejection},
    routing::get,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared handles for every handler
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub jwt: JwtKeys,
    pub broker: Arc<OAuthBroker>,
    pub registry: Arc<Registry>,
}

impl AppState {
    /// Wire the broker, the Spotify integration and the built-in registry
    /// on top of `stores`
    pub fn new(config: &Config, stores: Stores) -> Result<Self, AppError> {
        let broker = Arc::new(OAuthBroker::new(config, stores.users.clone()));
        let api = SpotifyClient::new(&config.spotify_api_base_url, config.http_timeout())?;
        let spotify = Arc::new(SpotifyIntegration::new(
            broker.clone(),
            stores.services.clone(),
            api,
        ));

        Ok(Self {
            jwt: JwtKeys::new(&config.jwt_secret, config.jwt_ttl_secs),
            registry: Arc::new(Registry::builtin(spotify)),
            broker,
            stores,
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registry", get(registry))
        .merge(auth::routes())
        .merge(users::routes())
        .merge(workspaces::routes())
        .merge(automates::routes())
        .merge(services::routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Trigger and action indices usable in automates
async fn registry(State(state): State<AppState>, _user: AuthUser) -> Json<RegistryListing> {
    Json(state.registry.listing())
}

/// `{"result": message}` acknowledgement for mutations
pub(crate) fn done(message: &str) -> Json<Value> {
    Json(json!({ "result": message }))
}

/// JSON body whose rejections render as `AppError::UnprocessableInput`
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| Payload(value))
            .map_err(|rejection: JsonRejection| AppError::unprocessable(rejection.body_text()))
    }
}

/// Reject blank required strings
pub(crate) fn required(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::unprocessable(format!("Missing field: {}", field)));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    pub(crate) fn app() -> (Router, AppState) {
        let state = AppState::new(&Config::for_tests(), Stores::memory()).unwrap();
        (router(state.clone()), state)
    }

    pub(crate) async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut request = axum::http::Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header("authorization", format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        app.clone().oneshot(request).await.unwrap()
    }

    pub(crate) async fn json_body(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    /// Register and log in, returning the raw JWT and the user id
    pub(crate) async fn sign_up(app: &Router, username: &str) -> (String, i64) {
        let response = send(
            app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "username": username,
                "email": format!("{}@example.com", username),
                "password": "correct horse"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let id = json_body(response).await["id"].as_i64().unwrap();

        let response = send(
            app,
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "username": username, "password": "correct horse" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let jwt = json_body(response).await["jwt"].as_str().unwrap().to_string();

        (jwt.trim_start_matches("Bearer ").to_string(), id)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (app, _) = app();
        let response = send(&app, Method::GET, "/health", None, None).await;

        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_registry_requires_auth_and_lists_builtins() {
        let (app, _) = app();
        let response = send(&app, Method::GET, "/registry", None, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (token, _) = sign_up(&app, "alice").await;
        let response = send(&app, Method::GET, "/registry", Some(&token), None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["triggers"][0]["name"], "spotify.not_playing");
        assert_eq!(body["triggers"][1]["name"], "spotify.playing");
        assert_eq!(body["actions"][0]["name"], "spotify.resume_playback");
        assert_eq!(body["actions"][1]["name"], "spotify.queue_track");
    }

    #[tokio::test]
    async fn test_malformed_body_is_unprocessable() {
        let (app, _) = app();
        let response = send(
            &app,
            Method::POST,
            "/auth/register",
            None,
            Some(json!({ "username": 12 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json_body(response).await["error"].is_string());
    }
}
