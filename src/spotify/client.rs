use crate::error::AppError;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Subset of `GET /me/player` we care about
#[derive(Debug, Deserialize)]
pub struct PlaybackState {
    #[serde(default)]
    pub is_playing: bool,
}

/// Thin Spotify Web API client for the player endpoints
#[derive(Clone)]
pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
}

impl SpotifyClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Whether the user's active device is currently playing
    ///
    /// Spotify answers `204 No Content` when no device is active, which we
    /// treat as not playing.
    ///
    /// # Errors
    /// - `ProviderApi` if the call fails or Spotify returns an error status
    pub async fn is_playing(&self, access_token: &str) -> Result<bool, AppError> {
        let response = self
            .http
            .get(format!("{}/me/player", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, "Failed to call Spotify player API");
                AppError::ProviderApi(format!("Failed to call GET /me/player: {}", e))
            })?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(false);
        }

        let response = check_status(response, "GET /me/player").await?;
        let state = response.json::<PlaybackState>().await.map_err(|e| {
            tracing::error!(error = ?e, "Failed to parse Spotify playback state");
            AppError::ProviderApi(format!("Failed to parse playback state: {}", e))
        })?;

        tracing::debug!(is_playing = state.is_playing, "Fetched Spotify playback state");
        Ok(state.is_playing)
    }

    /// Resume playback, or start `track_uri` when given
    pub async fn play(&self, access_token: &str, track_uri: Option<&str>) -> Result<(), AppError> {
        let body = match track_uri {
            Some(uri) => json!({ "uris": [uri] }),
            None => json!({}),
        };

        let response = self
            .http
            .put(format!("{}/me/player/play", self.base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::ProviderApi(format!("Failed to call PUT /me/player/play: {}", e))
            })?;

        check_status(response, "PUT /me/player/play").await?;
        Ok(())
    }

    /// Add `track_uri` to the end of the user's queue
    pub async fn queue(&self, access_token: &str, track_uri: &str) -> Result<(), AppError> {
        let response = self
            .http
            .post(format!("{}/me/player/queue", self.base_url))
            .bearer_auth(access_token)
            .query(&[("uri", track_uri)])
            .send()
            .await
            .map_err(|e| {
                AppError::ProviderApi(format!("Failed to call POST /me/player/queue: {}", e))
            })?;

        check_status(response, "POST /me/player/queue").await?;
        Ok(())
    }
}

async fn check_status(response: Response, call: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(call, status = %status, body = %body, "Spotify API returned error");
    Err(AppError::ProviderApi(format!(
        "{} returned {}: {}",
        call, status, body
    )))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::Query,
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::{get, post, put},
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    /// Requests seen by the fake player API, as `"METHOD detail"`
    pub(crate) type Calls = Arc<Mutex<Vec<String>>>;

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("Bearer "))
    }

    /// Fake player API. `playing` controls `GET /me/player`; `None` means no
    /// active device.
    pub(crate) async fn spawn_player(playing: Option<bool>) -> (String, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));

        let player = move |headers: HeaderMap| async move {
            if !authorized(&headers) {
                return AxumStatus::UNAUTHORIZED.into_response();
            }
            match playing {
                Some(is_playing) => {
                    Json(serde_json::json!({ "is_playing": is_playing })).into_response()
                }
                None => AxumStatus::NO_CONTENT.into_response(),
            }
        };

        let play_calls = calls.clone();
        let play = move |headers: HeaderMap, Json(body): Json<serde_json::Value>| async move {
            if !authorized(&headers) {
                return AxumStatus::UNAUTHORIZED.into_response();
            }
            play_calls.lock().unwrap().push(format!("PLAY {}", body));
            AxumStatus::NO_CONTENT.into_response()
        };

        let queue_calls = calls.clone();
        let queue = move |Query(query): Query<HashMap<String, String>>| async move {
            let uri = query.get("uri").cloned().unwrap_or_default();
            if uri.is_empty() {
                return AxumStatus::BAD_REQUEST.into_response();
            }
            queue_calls.lock().unwrap().push(format!("QUEUE {}", uri));
            AxumStatus::NO_CONTENT.into_response()
        };

        let app = Router::new()
            .route("/v1/me/player", get(player))
            .route("/v1/me/player/play", put(play))
            .route("/v1/me/player/queue", post(queue));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{}/v1", addr), calls)
    }

    fn client(base_url: &str) -> SpotifyClient {
        SpotifyClient::new(base_url, Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_is_playing() {
        let (base, _) = spawn_player(Some(true)).await;
        assert!(client(&base).is_playing("token").await.unwrap());

        let (base, _) = spawn_player(Some(false)).await;
        assert!(!client(&base).is_playing("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_active_device_is_not_playing() {
        let (base, _) = spawn_player(None).await;
        assert!(!client(&base).is_playing("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_play_and_queue() {
        let (base, calls) = spawn_player(Some(false)).await;
        let spotify = client(&base);

        spotify.play("token", None).await.unwrap();
        spotify
            .play("token", Some("spotify:track:3n3Ppam7vgaVa1iaRUc9Lp"))
            .await
            .unwrap();
        spotify
            .queue("token", "spotify:track:3n3Ppam7vgaVa1iaRUc9Lp")
            .await
            .unwrap();

        let calls = calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                "PLAY {}".to_string(),
                r#"PLAY {"uris":["spotify:track:3n3Ppam7vgaVa1iaRUc9Lp"]}"#.to_string(),
                "QUEUE spotify:track:3n3Ppam7vgaVa1iaRUc9Lp".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_error_status_is_provider_error() {
        let (base, _) = spawn_player(Some(true)).await;
        // Route does not exist on the fake server
        let result = client(&format!("{}/nope", base)).is_playing("token").await;
        assert!(matches!(result, Err(AppError::ProviderApi(_))));
    }
}
